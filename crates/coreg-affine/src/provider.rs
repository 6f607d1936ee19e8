use std::{collections::HashMap, path::Path, path::PathBuf};

use crate::grouping::ImagePair;

/// Error types for image providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The image could not be read
    #[error("failed to read image {path:?}: {message}")]
    ReadError {
        /// The image path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The pixel buffer does not match the declared shape
    #[error("image buffer holds {found} values, shape {shape:?} requires {expected}")]
    InvalidBuffer {
        /// The declared `[channels, height, width]` shape.
        shape: [usize; 3],
        /// Number of values the shape requires.
        expected: usize,
        /// Number of values present.
        found: usize,
    },

    /// The requested channel is not in the image
    #[error("channel '{name}' not found, available channels: {available:?}")]
    MissingChannel {
        /// The requested channel.
        name: String,
        /// Channel names present in the image, sorted.
        available: Vec<String>,
    },
}

/// A multi-channel image stored channel-major.
#[derive(Debug, Clone)]
pub struct ImageStack {
    shape: [usize; 3],
    data: Vec<f32>,
    channels: HashMap<String, usize>,
}

impl ImageStack {
    /// Create an image stack.
    ///
    /// # Arguments
    ///
    /// * `shape` - The `[channels, height, width]` shape.
    /// * `data` - The pixel values, one plane per channel.
    /// * `channels` - Channel name to plane index.
    pub fn new(
        shape: [usize; 3],
        data: Vec<f32>,
        channels: HashMap<String, usize>,
    ) -> Result<Self, ProviderError> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(ProviderError::InvalidBuffer {
                shape,
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            shape,
            data,
            channels,
        })
    }

    /// The `[channels, height, width]` shape.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Channel names, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names = self.channels.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// The plane of the named channel.
    pub fn channel(&self, name: &str) -> Option<&[f32]> {
        let index = *self.channels.get(name)?;
        if index >= self.shape[0] {
            return None;
        }
        let plane = self.shape[1] * self.shape[2];
        self.data.get(index * plane..(index + 1) * plane)
    }

    fn require_channel(&self, name: &str) -> Result<&[f32], ProviderError> {
        self.channel(name).ok_or_else(|| ProviderError::MissingChannel {
            name: name.to_string(),
            available: self.channel_names(),
        })
    }
}

/// Source of multi-channel images.
pub trait ImageProvider {
    /// Read the image at `path`.
    fn read_image(&self, path: &Path) -> Result<ImageStack, ProviderError>;
}

/// The two channel planes shown while placing landmarks.
#[derive(Debug, Clone)]
pub struct Backdrops {
    /// Reference plane.
    pub reference: Vec<f32>,
    /// `[height, width]` of the reference plane.
    pub reference_size: [usize; 2],
    /// Query plane.
    pub query: Vec<f32>,
    /// `[height, width]` of the query plane.
    pub query_size: [usize; 2],
}

/// Load the reference and query channel planes of an image pair.
pub fn load_backdrops<P: ImageProvider + ?Sized>(
    provider: &P,
    pair: &ImagePair,
    reference_channel: &str,
    query_channel: &str,
) -> Result<Backdrops, ProviderError> {
    let reference = provider.read_image(&pair.path_reference)?;
    let query = provider.read_image(&pair.path_query)?;

    let backdrops = Backdrops {
        reference: reference.require_channel(reference_channel)?.to_vec(),
        reference_size: [reference.shape[1], reference.shape[2]],
        query: query.require_channel(query_channel)?.to_vec(),
        query_size: [query.shape[1], query.shape[2]],
    };

    log::debug!(
        "Loaded backdrops {}:{} and {}:{}",
        pair.barcode_reference,
        reference_channel,
        pair.barcode_query,
        query_channel
    );

    Ok(backdrops)
}
