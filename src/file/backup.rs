//! バックアップファイル
//!
//! 上書き前の内容を `<file>~`（衝突時は `~.1`, `~.2`, ...）へ複製する。
//! バックアップディレクトリが設定されていれば、絶対パスの `/` を `!` に
//! 置き換えた名前でそのディレクトリに置く。

use crate::error::WriteError;
use crate::file::metadata::StatSnapshot;
use crate::file::path::{full_path, tail, with_trailing_slash};
use nix::unistd::geteuid;
use std::ffi::OsString;
use std::fs::{self, File, FileTimes, OpenOptions, Permissions};
use std::io::{self, ErrorKind};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::{fchown, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// 連番を試す上限
pub const MAX_BACKUP_ATTEMPTS: usize = 100_000;

/// `name+suffix`, `name+suffix.1`, ... のうち最初に存在しない名前
///
/// 上限まで埋まっていれば `None`。
pub fn get_next_filename(name: &Path, suffix: &str) -> Option<PathBuf> {
    let mut base = name.as_os_str().as_bytes().to_vec();
    base.extend_from_slice(suffix.as_bytes());

    (0..MAX_BACKUP_ATTEMPTS)
        .map(|attempt| {
            let mut candidate = base.clone();
            if attempt > 0 {
                candidate.extend_from_slice(format!(".{}", attempt).as_bytes());
            }
            PathBuf::from(OsString::from_vec(candidate))
        })
        .find(|candidate| fs::symlink_metadata(candidate).is_err())
}

/// バックアップファイル名を決める
pub fn backup_name(target: &Path, backup_dir: Option<&Path>) -> Option<PathBuf> {
    let base = match backup_dir {
        Some(dir) => {
            let escaped: Vec<u8> = match full_path(target) {
                Some(full) => full
                    .as_os_str()
                    .as_bytes()
                    .iter()
                    .map(|&b| if b == b'/' { b'!' } else { b })
                    .collect(),
                None => tail(target).into_bytes(),
            };

            let mut name = with_trailing_slash(dir.to_path_buf())
                .into_os_string()
                .into_vec();
            name.extend_from_slice(&escaped);
            PathBuf::from(OsString::from_vec(name))
        }
        None => target.to_path_buf(),
    };

    get_next_filename(&base, "~")
}

/// 元ファイルの内容・所有者・権限・時刻を引き継いだバックアップを作る
///
/// `insecure` のときは所有者・権限・時刻の設定失敗を無視し、
/// 既存ファイルへの追記も許す。
pub fn make_backup(
    original: &Path,
    backup_path: &Path,
    snapshot: &StatSnapshot,
    insecure: bool,
) -> Result<(), WriteError> {
    let mut source = File::open(original).map_err(|source| WriteError::Source {
        path: original.to_path_buf(),
        source,
    })?;

    let backup_error = |source: io::Error| WriteError::Backup {
        path: backup_path.to_path_buf(),
        source,
    };

    match fs::remove_file(backup_path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound || insecure => {}
        Err(e) => return Err(backup_error(e)),
    }

    let mut options = OpenOptions::new();
    options.write(true).append(true).mode(0o666);
    if insecure {
        options.create(true);
    } else {
        options.create_new(true);
    }
    let mut backup = options.open(backup_path).map_err(backup_error)?;

    if geteuid().is_root() {
        if let Err(e) = fchown(&backup, Some(snapshot.uid), Some(snapshot.gid)) {
            if !insecure {
                return Err(backup_error(e));
            }
        }
    }

    if let Err(e) = backup.set_permissions(Permissions::from_mode(snapshot.permissions())) {
        if !insecure {
            return Err(backup_error(e));
        }
    }

    io::copy(&mut source, &mut backup).map_err(backup_error)?;

    let times = FileTimes::new()
        .set_accessed(snapshot.accessed())
        .set_modified(snapshot.modified());
    if let Err(e) = backup.set_times(times) {
        if !insecure {
            return Err(backup_error(e));
        }
    }

    log::debug!(
        "backed up {} to {}",
        original.display(),
        backup_path.display()
    );
    Ok(())
}
