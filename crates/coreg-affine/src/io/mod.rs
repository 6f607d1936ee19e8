/// ITK transform file reader and writer.
pub mod itk;

/// Registration record export and import.
pub mod record;
