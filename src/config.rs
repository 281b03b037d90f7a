//! 設定
//!
//! バックアップ・ロック・閉じ込めディレクトリ・改行変換の各設定。
//! JSON ファイルから読み込み、ディレクトリ設定は `resolve` で検証する。

use crate::error::ConfigError;
use crate::file::path::full_path;
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// ロックファイルに記録するプログラム名
///
/// 記録のプログラム名欄（10 バイト）に収まるよう、版は major.minor まで。
pub const PROGRAM_NAME: &str = concat!(
    "altre ",
    env!("CARGO_PKG_VERSION_MAJOR"),
    ".",
    env!("CARGO_PKG_VERSION_MINOR")
);

/// コア設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// 上書き前にバックアップを作る
    pub backup: bool,
    /// バックアップを置くディレクトリ
    pub backup_dir: Option<PathBuf>,
    /// ロック・バックアップ作成時の排他作成や権限設定の失敗を許す
    pub insecure_backup: bool,
    /// ロックファイルを使う
    pub locking: bool,
    pub lock_prefix: String,
    pub lock_suffix: String,
    /// 閉じ込めディレクトリ
    pub operating_dir: Option<PathBuf>,
    /// 改行コードを変換せずに読む
    pub no_convert: bool,
    /// 読み込み後は常に Unix 形式として扱う
    pub make_it_unix: bool,
    /// 名前付きのファイルも新規ファイルとして扱う
    pub no_read: bool,
    /// ファイル挿入を新しいバッファで行う
    pub multibuffer: bool,
    pub softwrap: bool,
    /// 閲覧モード（書き込み不可の警告を出さない）
    pub view_mode: bool,
    pub program_name: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            backup: false,
            backup_dir: None,
            insecure_backup: false,
            locking: false,
            lock_prefix: ".".to_string(),
            lock_suffix: ".swp".to_string(),
            operating_dir: None,
            no_convert: false,
            make_it_unix: false,
            no_read: false,
            multibuffer: false,
            softwrap: false,
            view_mode: false,
            program_name: PROGRAM_NAME.to_string(),
        }
    }
}

impl CoreConfig {
    /// JSON 文字列から読み込む
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Malformed { source })
    }

    /// JSON ファイルから読み込む
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// ディレクトリ設定を絶対パス（末尾 `/` 付き）に置き換える
    ///
    /// 存在しない・入れない・ディレクトリでない場合はエラー。
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        if let Some(dir) = self.backup_dir.take() {
            let resolved = resolve_directory(&dir)
                .ok_or(ConfigError::InvalidBackupDir { path: dir })?;
            self.backup_dir = Some(resolved);
        }

        if let Some(dir) = self.operating_dir.take() {
            let resolved = resolve_directory(&dir)
                .ok_or(ConfigError::InvalidOperatingDir { path: dir })?;
            self.operating_dir = Some(resolved);
        }

        Ok(self)
    }
}

fn resolve_directory(dir: &Path) -> Option<PathBuf> {
    full_path(dir).filter(|full| full.as_os_str().as_bytes().ends_with(b"/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert!(!config.backup);
        assert_eq!(config.lock_prefix, ".");
        assert_eq!(config.lock_suffix, ".swp");
        assert!(config.program_name.starts_with("altre "));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CoreConfig::from_json_str(r#"{ "backup": true, "locking": true }"#).unwrap();
        assert!(config.backup);
        assert!(config.locking);
        assert_eq!(config.lock_suffix, ".swp");
        assert!(config.operating_dir.is_none());
    }

    #[test]
    fn test_malformed_json() {
        let err = CoreConfig::from_json_str("{ backup: ").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.json");
        fs::write(&path, r#"{ "no_convert": true, "lock_prefix": "~" }"#).unwrap();

        let config = CoreConfig::load(&path).unwrap();
        assert!(config.no_convert);
        assert_eq!(config.lock_prefix, "~");

        let missing = CoreConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn test_resolve_directories() {
        let dir = tempdir().unwrap();
        let config = CoreConfig {
            backup_dir: Some(dir.path().to_path_buf()),
            operating_dir: Some(dir.path().to_path_buf()),
            ..CoreConfig::default()
        }
        .resolve()
        .unwrap();

        let expected = full_path(dir.path()).unwrap();
        assert_eq!(config.backup_dir, Some(expected.clone()));
        assert_eq!(config.operating_dir, Some(expected));
    }

    #[test]
    fn test_resolve_rejects_invalid_directories() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "").unwrap();

        let err = CoreConfig {
            backup_dir: Some(file),
            ..CoreConfig::default()
        }
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBackupDir { .. }));

        let err = CoreConfig {
            operating_dir: Some(dir.path().join("missing")),
            ..CoreConfig::default()
        }
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOperatingDir { .. }));
    }
}
