//! 読み込み→上書き保存でバイト列が変わらないことの確認

use altre_filecore::{CoreConfig, EditorSession, HeadlessFrontend, LineFormat};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn open(path: &Path) -> EditorSession<HeadlessFrontend> {
    let mut session = EditorSession::new(CoreConfig::default(), HeadlessFrontend::default())
        .expect("session");
    assert!(session.open_buffer(path, true).expect("open"));
    session
}

fn assert_round_trip(bytes: &[u8], expected_format: LineFormat) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("fixture.txt");
    fs::write(&path, bytes).unwrap();

    let mut session = open(&path);
    assert_eq!(session.current_buffer().unwrap().format, expected_format);

    session.set_modified();
    let outcome = session.save().expect("save");
    assert!(outcome.is_written());

    assert_eq!(fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_unix_round_trip() {
    assert_round_trip(b"first line\nsecond line\n", LineFormat::Unix);
}

#[test]
fn test_dos_round_trip() {
    assert_round_trip(b"first line\r\nsecond line\r\n", LineFormat::Dos);
}

#[test]
fn test_mac_round_trip() {
    assert_round_trip(b"first line\rsecond line\r", LineFormat::Mac);
}

#[test]
fn test_mixed_round_trip() {
    assert_round_trip(b"a\r\nb\rc\nd\r\n", LineFormat::Mixed);
}

#[test]
fn test_nul_bytes_round_trip() {
    assert_round_trip(b"nul\0inside\n\0\0\nend\0", LineFormat::Unix);
    assert_round_trip(b"\0\r\n\0\r\n", LineFormat::Dos);
}

#[test]
fn test_no_trailing_newline_round_trip() {
    assert_round_trip(b"no newline at end", LineFormat::Unix);
    assert_round_trip(b"one\r\ntwo", LineFormat::Dos);
}

#[test]
fn test_format_detection_fixtures() {
    let cases: [(&[u8], LineFormat); 4] = [
        (b"a\nb\n", LineFormat::Unix),
        (b"a\r\nb\r\n", LineFormat::Dos),
        (b"a\rb\r", LineFormat::Mac),
        (b"a\r\nb\rc\n", LineFormat::Mixed),
    ];

    let temp_dir = TempDir::new().unwrap();
    for (index, (bytes, format)) in cases.iter().enumerate() {
        let path = temp_dir.path().join(format!("case{}.txt", index));
        fs::write(&path, bytes).unwrap();

        let session = open(&path);
        assert_eq!(session.current_buffer().unwrap().format, *format, "case {}", index);
    }
}

#[test]
fn test_empty_and_terminated_files_have_trailing_blank_line() {
    let temp_dir = TempDir::new().unwrap();

    for (name, bytes) in [("empty", &b""[..]), ("terminated", &b"only\n"[..])] {
        let path = temp_dir.path().join(name);
        fs::write(&path, bytes).unwrap();

        let session = open(&path);
        let lines = &session.current_buffer().unwrap().lines;
        assert!(lines.last().is_empty());
        assert_eq!(lines.reported_line_count(), lines.len() - 1);
    }
}
