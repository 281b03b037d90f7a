//! ファイル操作モジュール
//!
//! - パスの正規化と閉じ込めディレクトリ判定
//! - 改行形式を判定する読み込み
//! - バックアップ付きの書き込み（上書き・追記・前置）
//! - 他プロセスとの同時編集を知らせるロックファイル

pub mod backup;
pub mod lock;
pub mod metadata;
pub mod path;
pub mod reader;
pub mod writer;

// 公開API
pub use lock::{LockManager, LockOutcome, LockRecord};
pub use metadata::{LineEnding, LineFormat, StatSnapshot};
pub use path::{expand_tilde, full_path, has_valid_path, is_confined, outside_of_confinement};
pub use reader::{open_file, read_lines, OpenedFile, ReadOutcome};
pub use writer::{write_to_stream, BackupPolicy, FileWriter, WriteMode, WriteReport, WriteRequest};
