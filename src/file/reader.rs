//! ファイル読み込み
//!
//! バイト列を行ストアに変換し、改行形式を判定する。
//!
//! 形式の判定は最初の行で行う。先頭行（または既に DOS/Mac と判定済みの行）で
//! `\r\n` を見れば DOS、単独の `\r` を見れば Mac として数える。判定前の
//! 2行目以降では単独の `\r` は本文として残る。

use crate::buffer::{Line, LineStore};
use crate::error::{OpenError, ReadError};
use crate::file::metadata::{LineEnding, LineFormat};
use crate::file::path::full_path;
use crate::signals::{InterruptGuard, ResizeBlock};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::mem;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const CHUNK_SIZE: usize = 8192;

/// 読み込み結果
///
/// 中断やエラーがあっても、それまでに読んだ行は `store` に入っている。
#[derive(Debug)]
pub struct ReadOutcome {
    pub store: LineStore,
    pub format: LineFormat,
    /// 読み込んだ行数（末尾の空行は含まない）
    pub lines_read: usize,
    pub error: Option<ReadError>,
}

impl ReadOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// ステータス行に出すメッセージ
    pub fn status_message(&self) -> String {
        match self.format.conversion_note() {
            Some(note) => format!("Read {} {} ({})", self.lines_read, plural(self.lines_read), note),
            None => format!("Read {} {}", self.lines_read, plural(self.lines_read)),
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "line"
    } else {
        "lines"
    }
}

/// 読み込み状態（行バッファと形式判定）
struct LineSplitter {
    no_convert: bool,
    lines: Vec<Line>,
    pending: Vec<u8>,
    seen_dos: bool,
    seen_mac: bool,
    lines_read: usize,
}

impl LineSplitter {
    fn new(no_convert: bool) -> Self {
        Self {
            no_convert,
            lines: Vec::new(),
            pending: Vec::new(),
            seen_dos: false,
            seen_mac: false,
            lines_read: 0,
        }
    }

    fn feed(&mut self, byte: u8) {
        let pending_cr = !self.no_convert && self.pending.last() == Some(&b'\r');
        let classifying = self.lines_read == 0 || self.seen_dos || self.seen_mac;

        if byte == b'\n' {
            if pending_cr && classifying {
                self.seen_dos = true;
            }
        } else if pending_cr && classifying {
            self.seen_mac = true;
        } else {
            self.pending.push(byte);
            return;
        }

        let ending = if pending_cr {
            self.pending.pop();
            if byte == b'\n' {
                LineEnding::CrLf
            } else {
                LineEnding::Cr
            }
        } else {
            LineEnding::Lf
        };

        self.lines
            .push(Line::with_ending(mem::take(&mut self.pending), ending));
        self.lines_read += 1;

        // Mac 形式では `\r` の次の文字が次の行の先頭になる
        if byte != b'\n' {
            self.pending.push(byte);
        }
    }

    fn finish(mut self) -> (LineStore, LineFormat, usize) {
        if self.pending.is_empty() {
            self.lines.push(Line::new());
        } else if !self.no_convert && self.pending.last() == Some(&b'\r') {
            self.seen_mac = true;
            self.pending.pop();
            self.lines
                .push(Line::with_ending(mem::take(&mut self.pending), LineEnding::Cr));
            self.lines_read += 1;
            self.lines.push(Line::new());
        } else {
            self.lines.push(Line::from_bytes(mem::take(&mut self.pending)));
            self.lines_read += 1;
        }

        let format = LineFormat::from_flags(self.seen_dos, self.seen_mac);
        (LineStore::from_lines(self.lines), format, self.lines_read)
    }
}

/// ストリームを最後まで読み、行ストアを作る
///
/// `interrupt` が立つと読み込みを打ち切り、それまでの内容を返す。
pub fn read_lines<R: Read>(mut source: R, no_convert: bool, interrupt: &AtomicBool) -> ReadOutcome {
    let mut splitter = LineSplitter::new(no_convert);
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut error = None;

    let _resize = ResizeBlock::new();

    'reading: loop {
        let count = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(count) => count,
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                if interrupt.load(Ordering::SeqCst) {
                    error = Some(ReadError::Interrupted {
                        lines_read: splitter.lines_read,
                    });
                    break;
                }
                continue;
            }
            Err(source) => {
                log::error!("read failed after {} lines: {}", splitter.lines_read, source);
                error = Some(ReadError::Io {
                    lines_read: splitter.lines_read,
                    source,
                });
                break;
            }
        };

        for &byte in &chunk[..count] {
            if interrupt.load(Ordering::Relaxed) {
                error = Some(ReadError::Interrupted {
                    lines_read: splitter.lines_read,
                });
                break 'reading;
            }
            splitter.feed(byte);
        }
    }

    let (store, format, lines_read) = splitter.finish();
    log::debug!("read {} lines as {:?}", lines_read, format);

    ReadOutcome {
        store,
        format,
        lines_read,
        error,
    }
}

/// 読み込み可能な種類のファイルか確認する
///
/// ディレクトリ・デバイス・FIFO は読まない。存在しないパスは問題なし。
pub fn check_file_kind(path: &Path) -> Result<(), OpenError> {
    let Ok(meta) = fs::metadata(path) else {
        return Ok(());
    };
    let kind = meta.file_type();

    if kind.is_dir() {
        Err(OpenError::IsDirectory {
            path: path.to_path_buf(),
        })
    } else if kind.is_char_device() || kind.is_block_device() {
        Err(OpenError::IsDevice {
            path: path.to_path_buf(),
        })
    } else if kind.is_fifo() {
        Err(OpenError::IsFifo {
            path: path.to_path_buf(),
        })
    } else {
        Ok(())
    }
}

/// ファイルを開いた結果
#[derive(Debug)]
pub enum OpenedFile {
    /// 存在しないので新規ファイルとして扱う
    New,
    /// 開いたファイル（開くのに使ったパス付き）
    Existing { file: File, path: PathBuf },
}

/// 読み込み用にファイルを開く
///
/// `new_file_ok` が真なら、存在しないファイルは新規ファイルとして扱う。
pub fn open_file(filename: &Path, new_file_ok: bool) -> Result<OpenedFile, OpenError> {
    // 正規化したパスが使えず、与えられたパスなら使える場合はそちらを使う
    let path = match full_path(filename) {
        Some(full) if fs::metadata(&full).is_ok() || fs::metadata(filename).is_err() => full,
        _ => filename.to_path_buf(),
    };

    if fs::metadata(&path).is_err() {
        if new_file_ok {
            log::debug!("{} does not exist, treating as new file", path.display());
            return Ok(OpenedFile::New);
        }
        return Err(OpenError::NotFound {
            path: filename.to_path_buf(),
        });
    }

    let opened = {
        let _resize = ResizeBlock::new();
        let _interrupt = InterruptGuard::arm();
        File::open(&path)
    };

    match opened {
        Ok(file) => Ok(OpenedFile::Existing { file, path }),
        Err(e) if e.kind() == ErrorKind::Interrupted => Err(OpenError::Interrupted),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(OpenError::PermissionDenied {
            path: filename.to_path_buf(),
        }),
        Err(source) => Err(OpenError::Io {
            path: filename.to_path_buf(),
            source,
        }),
    }
}
