//! End-to-end landmark session: pick points, save, reload and resume.

use approx::assert_relative_eq;
use coreg_affine::{
    io::{
        itk::read_itk_transform,
        record::{import_record, read_record, save_session, RecordError, SessionPaths},
    },
    AffineTransform, PointAccumulator, Side,
};
use tempfile::tempdir;

fn picked_session() -> Result<PointAccumulator, Box<dyn std::error::Error>> {
    let truth = AffineTransform::from_list([0.5, 0.0, 13.0, 0.0, 2.0, -9.0]);
    let mut acc = PointAccumulator::new("S01", "S02");

    for p in [[0.0, 0.0], [100.0, 0.0], [0.0, 50.0], [40.0, 30.0]] {
        acc.submit_point(p, Side::Reference)?;
        // a second click on the same side is dropped
        assert_eq!(acc.submit_point([1.0, 1.0], Side::Reference)?, None);
        acc.submit_point(truth.transform_point(p), Side::Query)?;
    }

    // a stray point that gets taken back
    acc.submit_point([7.0, 7.0], Side::Reference)?;
    acc.undo_last()?;

    Ok(acc)
}

#[test]
fn test_save_and_reload_session() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let acc = picked_session()?;
    assert_eq!(acc.current_pairs().len(), 4);

    let paths = save_session(dir.path(), &acc, false)?;
    assert_eq!(paths, SessionPaths::new(dir.path(), "S01", "S02"));
    assert!(paths.record.exists());
    assert!(paths.transform.exists());

    let computed = acc.compute_transform()?;
    let params = computed.to_parameters();
    assert_relative_eq!(params.a, 0.5, epsilon = 1e-9);
    assert_relative_eq!(params.d, 2.0, epsilon = 1e-9);
    assert_relative_eq!(params.xoff, 13.0, epsilon = 1e-9);
    assert_relative_eq!(params.yoff, -9.0, epsilon = 1e-9);
    assert_eq!(params.b, 0.0);
    assert_eq!(params.c, 0.0);

    // the transform file reproduces the fitted transform exactly
    assert_eq!(read_itk_transform(&paths.transform)?.to_affine(), computed);

    let record = read_record(&paths.record)?;
    assert_eq!(record.barcode_reference, "S01");
    assert_eq!(record.barcode_query, "S02");
    let saved = record.parameters.ok_or("record has no parameters")?;
    assert_relative_eq!(saved.xoff, params.xoff, epsilon = 1e-9);
    assert_relative_eq!(saved.yoff, params.yoff, epsilon = 1e-9);
    assert_eq!(record.matrix.map(|m| m.len()), Some(3));

    let (reference, query) = import_record(&paths.record)?;
    assert_eq!(reference, acc.reference_points());
    assert_eq!(query, acc.query_points());
    Ok(())
}

#[test]
fn test_save_refuses_overwrite() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let acc = picked_session()?;
    save_session(dir.path(), &acc, false)?;

    assert!(matches!(
        save_session(dir.path(), &acc, false),
        Err(RecordError::AlreadyExists(_))
    ));
    save_session(dir.path(), &acc, true)?;
    Ok(())
}

#[test]
fn test_resume_session() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let acc = picked_session()?;
    let paths = save_session(dir.path(), &acc, false)?;

    let mut resumed = PointAccumulator::from_record(&read_record(&paths.record)?)?;
    assert_eq!(resumed.reference_points(), acc.reference_points());
    assert_eq!(resumed.compute_transform()?, acc.compute_transform()?);

    resumed.add_pair([10.0, 10.0], [18.0, 11.0])?;
    assert_eq!(resumed.current_pairs().len(), 5);
    Ok(())
}

#[test]
fn test_unbalanced_session_is_not_saved() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let mut acc = picked_session()?;
    acc.submit_point([3.0, 4.0], Side::Reference)?;

    assert!(matches!(
        save_session(dir.path(), &acc, false),
        Err(RecordError::Accumulator(_))
    ));
    assert!(!SessionPaths::new(dir.path(), "S01", "S02").record.exists());
    Ok(())
}
