//! ロックファイル管理
//!
//! 編集中のファイルと同じディレクトリに `<prefix><basename><suffix>` という
//! 1024 バイトの記録を置き、他のプロセスに編集中であることを知らせる。
//! ロックは助言的なもので、失敗しても編集は続行する。
//!
//! レイアウト:
//!
//! | offset | 内容 |
//! |---|---|
//! | 0..2 | マジック `0x62 0x30` |
//! | 2..12 | 作成プログラム名 |
//! | 24..28 | PID（リトルエンディアン） |
//! | 28..44 | ユーザー名 |
//! | 68..99 | ホスト名 |
//! | 108..876 | 対象ファイルの絶対パス |
//! | 1007 | 変更済みなら `0x55` |

use crate::error::LockError;
use nix::unistd::{gethostname, geteuid, User};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// ロック記録の長さ
pub const LOCK_SIZE: usize = 1024;
/// 有効とみなす最小の読み込み量
pub const MIN_LOCK_READ: usize = 48;
/// 既存ロックから読む最大量
const LOCK_READ_LIMIT: usize = 8192;

const MAGIC: [u8; 2] = [0x62, 0x30];
const MODIFIED_MARK: u8 = 0x55;

const PROGRAM_FIELD: (usize, usize) = (2, 10);
const PID_OFFSET: usize = 24;
const USER_FIELD: (usize, usize) = (28, 16);
const HOST_FIELD: (usize, usize) = (68, 31);
const PATH_FIELD: (usize, usize) = (108, 768);
const MODIFIED_OFFSET: usize = 1007;

/// ロックファイルの内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub program: String,
    pub pid: u32,
    pub user: String,
    pub host: String,
    pub path: PathBuf,
    pub modified: bool,
}

impl LockRecord {
    /// 固定長の記録に変換（長すぎるフィールドは切り詰める）
    pub fn encode(&self) -> [u8; LOCK_SIZE] {
        let mut data = [0u8; LOCK_SIZE];
        data[..2].copy_from_slice(&MAGIC);
        data[PID_OFFSET..PID_OFFSET + 4].copy_from_slice(&self.pid.to_le_bytes());

        put_field(&mut data, PROGRAM_FIELD, self.program.as_bytes());
        put_field(&mut data, USER_FIELD, self.user.as_bytes());
        put_field(&mut data, HOST_FIELD, self.host.as_bytes());
        put_field(&mut data, PATH_FIELD, self.path.as_os_str().as_bytes());

        if self.modified {
            data[MODIFIED_OFFSET] = MODIFIED_MARK;
        }
        data
    }

    /// ディスク上の記録を解釈する
    ///
    /// 48 バイト未満なら `None`。短い記録では範囲外のフィールドは空になる。
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < MIN_LOCK_READ {
            return None;
        }

        let mut pid = [0u8; 4];
        pid.copy_from_slice(&data[PID_OFFSET..PID_OFFSET + 4]);

        Some(Self {
            program: field_string(data, PROGRAM_FIELD),
            pid: u32::from_le_bytes(pid),
            user: field_string(data, USER_FIELD),
            host: field_string(data, HOST_FIELD),
            path: PathBuf::from(OsString::from_vec(field_bytes(data, PATH_FIELD).to_vec())),
            modified: data.get(MODIFIED_OFFSET) == Some(&MODIFIED_MARK),
        })
    }
}

fn put_field(data: &mut [u8], (offset, max): (usize, usize), value: &[u8]) {
    let len = value.len().min(max);
    data[offset..offset + len].copy_from_slice(&value[..len]);
}

fn field_bytes(data: &[u8], (offset, max): (usize, usize)) -> &[u8] {
    if offset >= data.len() {
        return &[];
    }
    let end = (offset + max).min(data.len());
    let field = &data[offset..end];
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..len]
}

fn field_string(data: &[u8], field: (usize, usize)) -> String {
    String::from_utf8_lossy(field_bytes(data, field)).into_owned()
}

/// このプロセスの身元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub program: String,
    pub pid: u32,
    pub user: String,
    pub host: String,
}

impl LockOwner {
    pub fn current(program: &str) -> Result<Self, LockError> {
        let user = match User::from_uid(geteuid()) {
            Ok(Some(user)) => user.name,
            _ => return Err(LockError::Identity),
        };
        let host = gethostname()
            .map_err(|source| LockError::Hostname { source })?
            .to_string_lossy()
            .into_owned();

        Ok(Self {
            program: program.to_string(),
            pid: std::process::id(),
            user,
            host,
        })
    }

    fn record_for(&self, target: &Path, modified: bool) -> LockRecord {
        LockRecord {
            program: self.program.clone(),
            pid: self.pid,
            user: self.user.clone(),
            host: self.host.clone(),
            path: target.to_path_buf(),
            modified,
        }
    }
}

/// ロック取得の結果
#[derive(Debug)]
pub enum LockOutcome {
    /// 新しいロックを作成した
    Created(PathBuf),
    /// 既存のロックを上書きしないことにした
    Declined,
    /// ロックなしで続行する
    Skipped(LockError),
}

/// ロックファイルの作成・更新・削除
#[derive(Debug, Clone)]
pub struct LockManager {
    prefix: String,
    suffix: String,
    insecure: bool,
    program: String,
}

impl LockManager {
    pub fn new(prefix: &str, suffix: &str, insecure: bool, program: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            insecure,
            program: program.to_string(),
        }
    }

    /// 対象ファイルに対応するロックファイル名
    pub fn lock_path_for(&self, target: &Path) -> PathBuf {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.as_os_str().as_bytes(),
            Some(_) => b".".as_slice(),
            None => b"/".as_slice(),
        };
        let base = target
            .file_name()
            .map_or(target.as_os_str().as_bytes(), |name| name.as_bytes());

        let mut name = Vec::with_capacity(
            dir.len() + self.prefix.len() + base.len() + self.suffix.len() + 1,
        );
        name.extend_from_slice(dir);
        if dir.last() != Some(&b'/') {
            name.push(b'/');
        }
        name.extend_from_slice(self.prefix.as_bytes());
        name.extend_from_slice(base);
        name.extend_from_slice(self.suffix.as_bytes());

        PathBuf::from(OsString::from_vec(name))
    }

    /// 既存のロックファイルを読む（存在しなければ `None`）
    pub fn inspect(&self, lock_path: &Path) -> Result<Option<LockRecord>, LockError> {
        if fs::metadata(lock_path).is_err() {
            return Ok(None);
        }

        let file = File::open(lock_path).map_err(|source| LockError::Open {
            path: lock_path.to_path_buf(),
            source,
        })?;

        let mut data = Vec::with_capacity(LOCK_SIZE);
        file.take(LOCK_READ_LIMIT as u64)
            .read_to_end(&mut data)
            .map_err(|source| LockError::Open {
                path: lock_path.to_path_buf(),
                source,
            })?;

        LockRecord::decode(&data).map(Some).ok_or(LockError::Undersized {
            path: lock_path.to_path_buf(),
            len: data.len(),
        })
    }

    /// ロックを取得する
    ///
    /// 既存のロックがあれば `confirm` に記録を渡し、真が返れば上書きする。
    pub fn acquire<F>(&self, target: &Path, confirm: F) -> LockOutcome
    where
        F: FnOnce(&LockRecord) -> bool,
    {
        let lock_path = self.lock_path_for(target);

        match self.inspect(&lock_path) {
            Ok(Some(existing)) => {
                log::info!(
                    "{} is locked by {} (pid {}, {})",
                    target.display(),
                    existing.user,
                    existing.pid,
                    existing.program
                );
                if !confirm(&existing) {
                    return LockOutcome::Declined;
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("ignoring unusable lock file: {}", e);
                return LockOutcome::Skipped(e);
            }
        }

        match self.write(&lock_path, target, false) {
            Ok(()) => LockOutcome::Created(lock_path),
            Err(e) => {
                log::warn!("editing {} without a lock: {}", target.display(), e);
                LockOutcome::Skipped(e)
            }
        }
    }

    /// ロック記録を書く（既存のファイルは必ず作り直す）
    pub fn write(&self, lock_path: &Path, target: &Path, modified: bool) -> Result<(), LockError> {
        // 失敗しうる処理を先に済ませる
        let owner = LockOwner::current(&self.program)?;

        if fs::symlink_metadata(lock_path).is_ok() {
            self.release(lock_path)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).append(true).mode(0o666);
        if self.insecure {
            options.create(true);
        } else {
            options.create_new(true);
        }

        let write_error = |source| LockError::Write {
            path: lock_path.to_path_buf(),
            source,
        };

        let mut file = options.open(lock_path).map_err(write_error)?;
        file.write_all(&owner.record_for(target, modified).encode())
            .map_err(write_error)?;
        file.flush().map_err(write_error)?;

        log::debug!("wrote lock file {}", lock_path.display());
        Ok(())
    }

    /// ロックファイルを削除する（存在しなければ何もしない）
    pub fn release(&self, lock_path: &Path) -> Result<(), LockError> {
        match fs::remove_file(lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Delete {
                path: lock_path.to_path_buf(),
                source,
            }),
        }
    }

    /// 変更済みの印を付けて記録を書き直す
    pub fn mark_modified(&self, lock_path: &Path, target: &Path) -> Result<(), LockError> {
        self.write(lock_path, target, true)
    }
}
