use cwlite_capture::{Capture, Trace};
use std::io::Cursor;

fn sample_capture() -> Capture {
    Capture::from(vec![
        Trace {
            key: vec![0x2b, 0x7e, 0x15, 0x16],
            plaintext: vec![0x32, 0x43, 0xf6, 0xa8],
            ciphertext: vec![0x39, 0x25, 0x84, 0x1d],
            power_measurements: vec![-0.5, 0.0009765625, 0.1, 1.0 / 3.0, -0.123456789012345],
        },
        Trace {
            key: vec![],
            plaintext: vec![],
            ciphertext: vec![],
            power_measurements: vec![],
        },
    ])
}

#[test]
fn round_trips_through_memory() {
    let capture = sample_capture();
    let bytes = capture.save_to(Vec::new()).unwrap();

    // gzip magic
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    let loaded = Capture::load_from(Cursor::new(bytes)).unwrap();
    assert_eq!(loaded, capture);
}

#[test]
fn round_trips_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.json.gz");

    let capture = sample_capture();
    capture.save(&path).unwrap();
    assert_eq!(Capture::load(&path).unwrap(), capture);

    // saving again replaces the file in place
    let smaller = Capture::from(vec![capture.traces()[1].clone()]);
    smaller.save(&path).unwrap();
    assert_eq!(Capture::load(&path).unwrap(), smaller);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn empty_capture_round_trips() {
    let bytes = Capture::new().save_to(Vec::new()).unwrap();
    assert!(Capture::load_from(bytes.as_slice()).unwrap().is_empty());
}

#[test]
fn reads_files_written_as_plain_gzip_json() {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let json = br#"[{"k":"K34VFg==","pt":"","ct":null,"pm":[0.25,-0.5]}]"#;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(json).unwrap();
    let bytes = encoder.finish().unwrap();

    let capture = Capture::load_from(bytes.as_slice()).unwrap();
    let trace = &capture.traces()[0];
    assert_eq!(trace.key, vec![0x2b, 0x7e, 0x15, 0x16]);
    assert!(trace.plaintext.is_empty());
    assert!(trace.ciphertext.is_empty());
    assert_eq!(trace.power_measurements, vec![0.25, -0.5]);
}

#[test]
fn invalid_base64_is_rejected() {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let json = br#"[{"k":"not base64!","pt":"","ct":"","pm":[]}]"#;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(json).unwrap();
    let bytes = encoder.finish().unwrap();

    assert!(Capture::load_from(bytes.as_slice()).is_err());
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Capture::load(dir.path().join("nope.json.gz")).is_err());
}
