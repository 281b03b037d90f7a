//! バッファ管理モジュール
//!
//! 行ストア、カーソル位置、開いているバッファの環状リストを提供

pub mod cursor;
pub mod lines;
pub mod list;

// 公開API
pub use cursor::{CursorPosition, Region};
pub use lines::{Line, LineStore};
pub use list::{BufferId, BufferList, OpenBuffer};
