//! ファイル書き込み
//!
//! 行ストアを上書き・追記・前置のいずれかでディスクへ書き出す。
//! 上書き前のバックアップ、前置用の一時ファイル、一時ファイル書き出しを扱う。
//!
//! 書き込みは途中で失敗すると対象ファイルが書きかけのまま残ることがある。
//! 安全策はバックアップのみ。

use crate::buffer::LineStore;
use crate::error::{CoreError, Result, WriteError};
use crate::file::backup;
use crate::file::metadata::{LineFormat, StatSnapshot};
use crate::file::path::{check_confinement, check_writable_directory, expand_tilde_path};
use crate::signals::{InterruptGuard, ResizeBlock};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// 一時ファイル名の接頭辞
const TEMP_PREFIX: &str = "altre.";

/// 書き込み方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Overwrite,
    Append,
    Prepend,
}

/// バックアップ方針
#[derive(Debug, Clone, Default)]
pub struct BackupPolicy {
    pub enabled: bool,
    /// 正規化済みのバックアップディレクトリ
    pub dir: Option<PathBuf>,
    pub insecure: bool,
}

/// 1回の書き込み要求
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub target: &'a Path,
    pub lines: &'a LineStore,
    pub format: LineFormat,
    pub mode: WriteMode,
    /// 他人に読めない一時ファイルとして新規作成する
    pub temporary: bool,
    /// バッファが保持している stat
    pub snapshot: Option<&'a StatSnapshot>,
    /// 範囲の書き出し（バッファ全体ではない）
    pub region: bool,
}

impl<'a> WriteRequest<'a> {
    pub fn new(target: &'a Path, lines: &'a LineStore, format: LineFormat) -> Self {
        Self {
            target,
            lines,
            format,
            mode: WriteMode::Overwrite,
            temporary: false,
            snapshot: None,
            region: false,
        }
    }

    pub fn mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn snapshot(mut self, snapshot: Option<&'a StatSnapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn region(mut self, region: bool) -> Self {
        self.region = region;
        self
    }
}

/// 書き込み結果
#[derive(Debug, Clone)]
pub struct WriteReport {
    /// チルダ展開後の書き込み先
    pub path: PathBuf,
    pub lines_written: usize,
    /// 上書き後の stat（一時ファイル・追記・前置では `None`）
    pub stat: Option<StatSnapshot>,
}

impl WriteReport {
    pub fn status_message(&self) -> String {
        let noun = if self.lines_written == 1 { "line" } else { "lines" };
        format!("Wrote {} {}", self.lines_written, noun)
    }
}

/// 行を書き出し、行数を返す
///
/// 最後の行の後には終端を付けない。最後の行が空なら行数に数えない。
pub fn serialize_lines<W: Write>(
    out: &mut W,
    lines: &LineStore,
    format: LineFormat,
) -> io::Result<usize> {
    let default_ending = format.terminator();
    let last = lines.len() - 1;

    for (index, line) in lines.lines().enumerate() {
        out.write_all(line.text())?;
        if index < last {
            let ending = match format {
                LineFormat::Mixed => line.ending().unwrap_or(default_ending),
                _ => default_ending,
            };
            out.write_all(ending.as_bytes())?;
        }
    }

    Ok(lines.reported_line_count())
}

/// 既に開いているストリームへ書き出す
pub fn write_to_stream<W: Write>(
    stream: &mut W,
    lines: &LineStore,
    format: LineFormat,
) -> std::result::Result<usize, WriteError> {
    serialize_lines(stream, lines, format)
        .and_then(|count| stream.flush().map(|()| count))
        .map_err(|source| WriteError::Write {
            path: PathBuf::from("<stream>"),
            source,
        })
}

/// 一時ファイルを置くディレクトリ
///
/// `TMPDIR`、既定の一時ディレクトリ、`/tmp/` の順に書き込めるものを選ぶ。
pub fn safe_temp_dir() -> PathBuf {
    let from_env = env::var_os("TMPDIR").map(PathBuf::from);
    select_temp_dir(from_env.as_deref(), &env::temp_dir())
}

fn select_temp_dir(from_env: Option<&Path>, platform_default: &Path) -> PathBuf {
    from_env
        .and_then(check_writable_directory)
        .or_else(|| check_writable_directory(platform_default))
        .unwrap_or_else(|| PathBuf::from("/tmp/"))
}

/// 所有者のみ読み書きできる一時ファイルを作る
pub fn safe_tempfile() -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .rand_bytes(6)
        .tempfile_in(safe_temp_dir())
}

/// ファイル書き込み
#[derive(Debug, Default)]
pub struct FileWriter {
    backup: BackupPolicy,
    operating_dir: Option<PathBuf>,
    /// 「バックアップなしで続行」の回答（最後に尋ねたバックアップ名ごと）
    backup_answer: Option<(PathBuf, bool)>,
}

impl FileWriter {
    pub fn new(backup: BackupPolicy, operating_dir: Option<PathBuf>) -> Self {
        Self {
            backup,
            operating_dir,
            backup_answer: None,
        }
    }

    /// 書き込みを実行する
    ///
    /// バックアップに失敗すると `confirm_without_backup` にバックアップ名を渡して
    /// 続行するか尋ねる（同じ名前について尋ねるのは一度だけ）。
    ///
    /// # Panics
    ///
    /// 書き込み先の名前が空の場合。
    pub fn write<F>(
        &mut self,
        request: &WriteRequest<'_>,
        confirm_without_backup: F,
    ) -> Result<WriteReport>
    where
        F: FnMut(&Path) -> bool,
    {
        if request.target.as_os_str().is_empty() {
            panic!("tried to write a nameless file");
        }

        let realname = expand_tilde_path(request.target);

        // 一時ファイルは閉じ込めの外に出ることがある
        if !request.temporary {
            check_confinement(&realname, self.operating_dir.as_deref(), "write")?;
        }

        if request.temporary && fs::symlink_metadata(&realname).is_ok() {
            return Err(WriteError::TemporaryExists { path: realname }.into());
        }

        let current = if request.temporary {
            None
        } else {
            StatSnapshot::capture(&realname).ok()
        };
        let snapshot = request.snapshot.copied().or(current);

        if let (Some(current), Some(snapshot)) = (current, snapshot) {
            let unchanged = snapshot.same_mtime(&current);
            if self.backup.enabled
                && (request.mode != WriteMode::Overwrite || request.region || unchanged)
            {
                self.backup_stage(&realname, &snapshot, confirm_without_backup)?;
            } else if self.backup.enabled {
                log::info!("{} changed on disk, not backing it up", realname.display());
            }
        }

        let mut saved_tail = match request.mode {
            WriteMode::Prepend => Some(copy_to_tempfile(&realname)?),
            _ => None,
        };

        let mut file = open_target(&realname, request)?;

        let write_error = |source| WriteError::Write {
            path: realname.clone(),
            source,
        };

        let lines_written =
            serialize_lines(&mut file, request.lines, request.format).map_err(write_error)?;

        if let Some(tail) = saved_tail.as_mut() {
            let copied = tail
                .as_file_mut()
                .seek(SeekFrom::Start(0))
                .and_then(|_| io::copy(tail.as_file_mut(), &mut file));
            copied.map_err(write_error)?;
        }

        file.flush().map_err(|source| WriteError::Close {
                path: realname.clone(),
                source,
            })?;
        drop(file);

        // 一時ファイルはここで消える
        if let Some(tail) = saved_tail {
            tail.close().map_err(|source| WriteError::TempFile { source })?;
        }

        let stat = if request.mode == WriteMode::Overwrite && !request.temporary {
            StatSnapshot::capture(&realname).ok()
        } else {
            None
        };

        log::info!("wrote {} lines to {}", lines_written, realname.display());

        Ok(WriteReport {
            path: realname,
            lines_written,
            stat,
        })
    }

    fn backup_stage<F>(
        &mut self,
        realname: &Path,
        snapshot: &StatSnapshot,
        mut confirm: F,
    ) -> Result<()>
    where
        F: FnMut(&Path) -> bool,
    {
        let Some(name) = backup::backup_name(realname, self.backup.dir.as_deref()) else {
            log::error!("no free backup name for {}", realname.display());
            return Err(WriteError::TooManyBackups {
                path: realname.to_path_buf(),
            }
            .into());
        };

        match backup::make_backup(realname, &name, snapshot, self.backup.insecure) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("backup failed: {}", e);
                let proceed = match &self.backup_answer {
                    Some((asked, answer)) if asked == &name => *answer,
                    _ => {
                        let answer = confirm(&name);
                        self.backup_answer = Some((name.clone(), answer));
                        answer
                    }
                };

                if proceed {
                    log::warn!("continuing without backup of {}", realname.display());
                    Ok(())
                } else {
                    Err(CoreError::from(e))
                }
            }
        }
    }
}

/// 前置のため既存の内容を一時ファイルへ退避する
fn copy_to_tempfile(realname: &Path) -> std::result::Result<NamedTempFile, WriteError> {
    let mut source = File::open(realname).map_err(|source| WriteError::Source {
        path: realname.to_path_buf(),
        source,
    })?;

    let mut temp = safe_tempfile().map_err(|source| WriteError::TempFile { source })?;
    io::copy(&mut source, temp.as_file_mut())
        .and_then(|_| temp.as_file_mut().flush())
        .map_err(|source| WriteError::TempFile { source })?;

    log::debug!("saved {} to {}", realname.display(), temp.path().display());
    Ok(temp)
}

fn open_target(
    realname: &Path,
    request: &WriteRequest<'_>,
) -> std::result::Result<File, WriteError> {
    let mut options = OpenOptions::new();
    options.write(true);

    match request.mode {
        WriteMode::Append => {
            options.append(true).create(true);
        }
        _ if request.temporary => {
            options.create_new(true);
        }
        _ => {
            options.truncate(true).create(true);
        }
    }
    options.mode(if request.temporary { 0o600 } else { 0o666 });

    let opened = {
        let _resize = ResizeBlock::new();
        let _interrupt = InterruptGuard::arm();
        options.open(realname)
    };

    opened.map_err(|source| {
        if source.kind() == ErrorKind::Interrupted {
            WriteError::Interrupted
        } else {
            log::error!("cannot open {} for writing: {}", realname.display(), source);
            WriteError::Open {
                path: realname.to_path_buf(),
                source,
            }
        }
    })
}
