//! altre-filecore - altre エディタのファイル永続化・バッファ管理コア
//!
//! ファイルの読み込み（改行形式の判定）、書き込み（上書き・追記・前置、
//! バックアップ）、ロックファイルによる同時編集の通知、パスの正規化と
//! 閉じ込めディレクトリ、開いているバッファの環状リストを提供する。

// 共通基盤
pub mod config;
pub mod error;
pub mod logging;
pub mod signals;

// データ層
pub mod buffer;
pub mod file;

// 外部との接点
pub mod frontend;
pub mod session;

// 公開API
pub use buffer::{BufferId, BufferList, CursorPosition, Line, LineStore, OpenBuffer, Region};
pub use config::CoreConfig;
pub use error::{CoreError, MessageLevel, Result};
pub use file::{LineEnding, LineFormat, StatSnapshot, WriteMode, WriteReport};
pub use frontend::{Answer, Frontend, HeadlessFrontend, Prompt};
pub use session::{EditorSession, SaveOutcome};
