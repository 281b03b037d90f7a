//! フロントエンド抽象
//!
//! コアが利用者とやり取りする窓口。確認の問い合わせ、ステータス表示、
//! 再描画の要求、保存時点の通知を受け持つ。

pub mod headless;

pub use headless::HeadlessFrontend;

use crate::buffer::BufferId;
use crate::error::MessageLevel;
use crate::file::lock::LockRecord;
use std::path::Path;

/// 問い合わせの種類
#[derive(Debug, Clone, Copy)]
pub enum Prompt<'a> {
    /// バックアップに失敗したが保存を続けるか
    BackupFailed { backup: &'a Path },
    /// 他のプロセスが編集中だが開くか
    LockOverride {
        path: &'a Path,
        record: &'a LockRecord,
    },
    /// 開いた後にディスク上で変更されたが保存するか
    ModifiedSinceOpen,
    /// 別の名前で保存するか
    SaveUnderDifferentName,
    /// 既存ファイルを上書きするか
    OverwriteExisting { path: &'a Path },
}

impl Prompt<'_> {
    /// 利用者に見せる文言
    pub fn text(&self) -> String {
        match self {
            Prompt::BackupFailed { .. } => {
                "Failed to write backup file; continue saving? (Say N if unsure.) ".to_string()
            }
            Prompt::LockOverride { path, record } => format!(
                "File {} is being edited (by {} with {}, PID {}); continue?",
                path.display(),
                record.user,
                record.program,
                record.pid
            ),
            Prompt::ModifiedSinceOpen => {
                "File was modified since you opened it; continue saving? ".to_string()
            }
            Prompt::SaveUnderDifferentName => "Save file under DIFFERENT NAME? ".to_string(),
            Prompt::OverwriteExisting { path } => {
                format!("File \"{}\" exists; OVERWRITE? ", path.display())
            }
        }
    }
}

/// 問い合わせへの回答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Cancel,
}

/// コアから呼ばれるフロントエンドの操作
pub trait Frontend {
    /// はい／いいえ（／取り消し）を尋ねる
    fn ask(&mut self, prompt: &Prompt<'_>) -> Answer;

    /// ステータスメッセージを表示する（応答は待たない）
    fn report(&mut self, level: MessageLevel, message: &str);

    /// コアのデータが変わったことを知らせる
    fn refresh_display(&mut self) {}

    /// バッファ全体を保存した（アンドゥ履歴の保存点を記録する）
    fn mark_saved(&mut self, _buffer: BufferId) {}
}
