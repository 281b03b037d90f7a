//! エラーハンドリングシステム
//!
//! ファイル永続化コア全体で使用されるエラー型を定義する。
//! - パス・オープン・読み込みエラーは要求された操作を中断し、以前の状態は保持
//! - 書き込みエラーはその書き込みのみを中断
//! - ロックエラーは常に非致命的（編集はロックなしで続行）

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// コア全体のエラー型
#[derive(Error, Debug)]
pub enum CoreError {
    /// パス解決・閉じ込めエラー
    #[error(transparent)]
    Path(#[from] PathError),

    /// ファイルオープンエラー
    #[error(transparent)]
    Open(#[from] OpenError),

    /// 読み込みエラー
    #[error(transparent)]
    Read(#[from] ReadError),

    /// 書き込みエラー
    #[error(transparent)]
    Write(#[from] WriteError),

    /// ロックファイルエラー
    #[error(transparent)]
    Lock(#[from] LockError),

    /// バッファリスト操作エラー
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// 設定エラー
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// パス固有のエラー
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Directory '{}' does not exist", .path.display())]
    MissingDirectory { path: PathBuf },

    #[error("Path '{}': {source}", .path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Path '{}' is not a directory", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("Path '{}' is not accessible", .path.display())]
    NotSearchable { path: PathBuf },

    #[error("Directory '{}' is not writable", .path.display())]
    NotWritable { path: PathBuf },

    #[error("Can't {action} outside of {}", .root.display())]
    OutsideConfinement {
        action: &'static str,
        path: PathBuf,
        root: PathBuf,
    },
}

/// ファイルオープン固有のエラー
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("File \"{}\" not found", .path.display())]
    NotFound { path: PathBuf },

    #[error("\"{}\" is a directory", .path.display())]
    IsDirectory { path: PathBuf },

    #[error("\"{}\" is a device file", .path.display())]
    IsDevice { path: PathBuf },

    #[error("\"{}\" is a FIFO", .path.display())]
    IsFifo { path: PathBuf },

    #[error("Error reading {}: Permission denied", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Interrupted")]
    Interrupted,

    #[error("Error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 読み込み固有のエラー
///
/// どちらの場合も、それまでに読み込んだ行はバッファに取り込まれる。
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Interrupted")]
    Interrupted { lines_read: usize },

    #[error("{source}")]
    Io {
        lines_read: usize,
        #[source]
        source: io::Error,
    },
}

/// 書き込み固有のエラー
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Interrupted")]
    Interrupted,

    #[error("Error writing {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error writing {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error writing {}: {source}", .path.display())]
    Close {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Temporary file {} already exists", .path.display())]
    TemporaryExists { path: PathBuf },

    #[error("Error writing backup file {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error writing backup file {}: Too many backup files?", .path.display())]
    TooManyBackups { path: PathBuf },

    #[error("Error reading {}: {source}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error writing temp file: {source}")]
    TempFile {
        #[source]
        source: io::Error,
    },
}

/// ロックファイル固有のエラー（常に非致命的）
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Couldn't determine my identity for lock file")]
    Identity,

    #[error("Couldn't determine hostname: {source}")]
    Hostname {
        #[source]
        source: nix::Error,
    },

    #[error("Error opening lock file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error reading lock file {}: Not enough data read", .path.display())]
    Undersized { path: PathBuf, len: usize },

    #[error("Error writing lock file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error deleting lock file {}: {source}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// バッファリスト固有のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Cannot close the only open buffer")]
    LastBuffer,

    #[error("No open buffer")]
    NoBuffer,

    #[error("Buffer has no file name")]
    Unnamed,

    #[error("Invalid cursor position: line {line}, column {column}")]
    InvalidCursor { line: usize, column: usize },
}

/// 設定固有のエラー
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid backup directory: {}", .path.display())]
    InvalidBackupDir { path: PathBuf },

    #[error("Invalid operating directory: {}", .path.display())]
    InvalidOperatingDir { path: PathBuf },

    #[error("Invalid configuration file: {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
}

/// ステータスメッセージの重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    /// 控えめな通知（行数表示など）
    Hush,
    /// 通常の情報
    Info,
    /// 軽い警告（ロック関連など）
    Mild,
    /// 操作失敗の警告
    Alert,
}

impl CoreError {
    /// エラーの表示レベルを判定
    pub fn level(&self) -> MessageLevel {
        match self {
            CoreError::Lock(_) => MessageLevel::Mild,
            CoreError::Path(PathError::NotWritable { .. }) => MessageLevel::Mild,
            CoreError::Write(WriteError::Backup { .. } | WriteError::TooManyBackups { .. }) => {
                MessageLevel::Hush
            }
            _ => MessageLevel::Alert,
        }
    }

    /// ユーザー割り込みによる中断かどうか
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            CoreError::Open(OpenError::Interrupted)
                | CoreError::Read(ReadError::Interrupted { .. })
                | CoreError::Write(WriteError::Interrupted)
        )
    }
}

/// プロジェクト標準のResult型
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_errors_are_mild() {
        let error: CoreError = LockError::Identity.into();
        assert_eq!(error.level(), MessageLevel::Mild);
        assert!(!error.is_interrupted());
    }

    #[test]
    fn test_open_error_messages() {
        let error = OpenError::IsDirectory {
            path: PathBuf::from("/tmp"),
        };
        assert_eq!(error.to_string(), "\"/tmp\" is a directory");

        let error: CoreError = OpenError::Interrupted.into();
        assert!(error.is_interrupted());
        assert_eq!(error.level(), MessageLevel::Alert);
    }

    #[test]
    fn test_confinement_message() {
        let error = PathError::OutsideConfinement {
            action: "write",
            path: PathBuf::from("/etc/passwd"),
            root: PathBuf::from("/home/user/"),
        };
        assert_eq!(error.to_string(), "Can't write outside of /home/user/");
    }
}
