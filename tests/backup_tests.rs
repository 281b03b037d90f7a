//! バックアップの命名と内容

use altre_filecore::{CoreConfig, EditorSession, HeadlessFrontend, WriteMode};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

fn backup_config() -> CoreConfig {
    CoreConfig {
        backup: true,
        ..CoreConfig::default()
    }
}

#[test]
fn test_backup_names_never_collide() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("target.txt");
    fs::write(&path, "v0\n").unwrap();

    let mut session = EditorSession::new(backup_config(), HeadlessFrontend::default()).unwrap();
    session.open_buffer(&path, true).unwrap();

    for _ in 0..150 {
        session.write_buffer(&path, WriteMode::Overwrite).unwrap();
    }

    assert!(temp_dir.path().join("target.txt~").exists());
    for n in 1..150 {
        let name = format!("target.txt~.{}", n);
        assert!(temp_dir.path().join(&name).exists(), "missing {}", name);
    }
    assert!(!temp_dir.path().join("target.txt~.150").exists());
}

#[test]
fn test_backup_keeps_original_content_and_mode() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("script.sh");
    fs::write(&path, "echo old\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o750)).unwrap();

    let mut session = EditorSession::new(backup_config(), HeadlessFrontend::default()).unwrap();
    session.open_buffer(&path, true).unwrap();
    session.current_buffer_mut().unwrap().lines =
        altre_filecore::LineStore::from_texts(["echo new", ""]);
    session.set_modified();
    session.save().unwrap();

    let backup = temp_dir.path().join("script.sh~");
    assert_eq!(fs::read(&backup).unwrap(), b"echo old\n");
    assert_eq!(fs::read(&path).unwrap(), b"echo new\n");
    let mode = fs::metadata(&backup).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o750);
}

#[test]
fn test_backup_directory_escapes_path() {
    let temp_dir = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    let path = temp_dir.path().join("escaped.txt");
    fs::write(&path, "before\n").unwrap();

    let config = CoreConfig {
        backup_dir: Some(backups.path().to_path_buf()),
        ..backup_config()
    };
    let mut session = EditorSession::new(config, HeadlessFrontend::default()).unwrap();
    session.open_buffer(&path, true).unwrap();
    session.write_buffer(&path, WriteMode::Overwrite).unwrap();

    let full = session.resolve_path(&path).unwrap();
    let escaped = full.to_string_lossy().replace('/', "!") + "~";
    let backup = session
        .config()
        .backup_dir
        .as_ref()
        .unwrap()
        .join(escaped);
    assert_eq!(fs::read(&backup).unwrap(), b"before\n");
}

#[test]
fn test_no_backup_for_new_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("brand_new.txt");

    let mut session = EditorSession::new(backup_config(), HeadlessFrontend::default()).unwrap();
    session.open_buffer(&path, true).unwrap();
    session.write_buffer(&path, WriteMode::Overwrite).unwrap();

    assert!(path.exists());
    assert!(!temp_dir.path().join("brand_new.txt~").exists());
}
