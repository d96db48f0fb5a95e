//! Instance reader tests against real files on disk.

use std::io::Write;

use tempfile::NamedTempFile;

use wave_picking::instance::{Instance, InstanceError};

fn write_instance(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn reads_an_instance_from_disk() {
    let file = write_instance("2 2 2\n1 0 3\n1 1 2\n1 0 5\n1 1 5\n0 10\n");
    let inst = Instance::from_path(file.path()).unwrap();
    assert_eq!(inst.num_orders(), 2);
    assert_eq!(inst.num_aisles(), 2);
    assert_eq!(inst.wave_ub, 10);
}

#[test]
fn missing_file_surfaces_an_io_error() {
    let err = Instance::from_path("/nonexistent/wave/instance.txt").unwrap_err();
    assert!(matches!(err, InstanceError::Io(_)));
}

#[test]
fn crlf_and_mixed_whitespace_are_accepted() {
    let file = write_instance("1 1 1\r\n1\t0 3\r\n1 0 5\r\n3\t3\r\n");
    let inst = Instance::from_path(file.path()).unwrap();
    assert_eq!(inst.orders[0], vec![(0, 3)]);
    assert_eq!((inst.wave_lb, inst.wave_ub), (3, 3));
}

#[test]
fn error_offset_points_at_the_bad_token() {
    let text = "1 1 1\n1 0 3\n1 0 bad\n3 3\n";
    let err = Instance::parse(text).unwrap_err();
    match err {
        InstanceError::BadToken { offset, ref token, .. } => {
            assert_eq!(&text[offset..offset + token.len()], "bad");
        }
        other => panic!("expected BadToken, got {other:?}"),
    }
}

#[test]
fn truncation_is_reported_at_end_of_input() {
    let text = "1 1 1\n1 0 3\n1 0 5\n3";
    let err = Instance::parse(text).unwrap_err();
    match err {
        InstanceError::Truncated { offset, .. } => assert_eq!(offset, text.len()),
        other => panic!("expected Truncated, got {other:?}"),
    }
}
