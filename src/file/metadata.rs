//! ファイルメタデータ管理
//!
//! 読み書き時点の stat スナップショットと改行形式の管理

use std::fs::{self, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 最後に成功した読み書き時点のファイル識別情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatSnapshot {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub atime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
}

impl StatSnapshot {
    /// パスの stat を取得（シンボリックリンクは辿る）
    pub fn capture(path: &Path) -> io::Result<Self> {
        fs::metadata(path).map(|meta| Self::from_metadata(&meta))
    }

    /// 取得済みメタデータから構築
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            atime: meta.atime(),
            atime_nsec: meta.atime_nsec(),
            mtime: meta.mtime(),
            mtime_nsec: meta.mtime_nsec(),
        }
    }

    /// 読み込み後にディスク上のファイルが変わったか
    ///
    /// 更新時刻が新しくなったか、デバイスまたは inode が変わった場合に真。
    pub fn changed_on_disk(&self, current: &StatSnapshot) -> bool {
        self.mtime < current.mtime || self.dev != current.dev || self.ino != current.ino
    }

    /// 更新時刻（秒単位）が一致するか
    pub fn same_mtime(&self, current: &StatSnapshot) -> bool {
        self.mtime == current.mtime
    }

    /// パーミッションビット（setuid 等を含む）
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    pub fn accessed(&self) -> SystemTime {
        to_system_time(self.atime, self.atime_nsec)
    }

    pub fn modified(&self) -> SystemTime {
        to_system_time(self.mtime, self.mtime_nsec)
    }
}

fn to_system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = nsecs.clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0) + Duration::new(0, nanos)
    }
}

/// 1行の終端（読み込み時に見つかったもの）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,   // \n
    CrLf, // \r\n
    Cr,   // \r
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
            LineEnding::Cr => b"\r",
        }
    }
}

/// バッファの改行形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineFormat {
    #[default]
    Unix,
    Dos,
    Mac,
    /// DOS と Mac の混在
    Mixed,
}

impl LineFormat {
    /// 読み込み時の分類結果から形式を決める
    pub fn from_flags(seen_dos: bool, seen_mac: bool) -> Self {
        match (seen_dos, seen_mac) {
            (true, true) => LineFormat::Mixed,
            (true, false) => LineFormat::Dos,
            (false, true) => LineFormat::Mac,
            (false, false) => LineFormat::Unix,
        }
    }

    /// 書き込み時の既定の行終端
    pub fn terminator(self) -> LineEnding {
        match self {
            LineFormat::Unix => LineEnding::Lf,
            LineFormat::Dos | LineFormat::Mixed => LineEnding::CrLf,
            LineFormat::Mac => LineEnding::Cr,
        }
    }

    /// 読み込みメッセージに付ける変換注記
    pub fn conversion_note(self) -> Option<&'static str> {
        match self {
            LineFormat::Unix => None,
            LineFormat::Dos => Some("Converted from DOS format"),
            LineFormat::Mac => Some("Converted from Mac format"),
            LineFormat::Mixed => Some("Converted from DOS and Mac format"),
        }
    }

    /// バッファ切り替え時の表示ラベル
    pub fn label(self) -> Option<&'static str> {
        match self {
            LineFormat::Dos => Some("DOS"),
            LineFormat::Mac => Some("Mac"),
            LineFormat::Unix | LineFormat::Mixed => None,
        }
    }
}
