//! パス処理ユーティリティ
//!
//! チルダ展開、絶対パス化（正規化）、閉じ込めディレクトリの判定を提供する。
//!
//! 正規化結果はディレクトリの場合に末尾 `/` を保持する。閉じ込め判定は
//! この文字列に対する前方一致で行うため、ファイルシステム境界の検査ではない。
//! 判定後に作られたシンボリックリンクは検出できない。

use crate::error::PathError;
use nix::unistd::{access, AccessFlags, User};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// chdir/getcwd の組を直列化するためのロック
static CWD_LOCK: Mutex<()> = Mutex::new(());

/// 作業ディレクトリ取得に失敗したとき上へ辿る最大回数
const MAX_CWD_CLIMB: usize = 20;

/// ディレクトリ部分の正規化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// `realpath` 相当のプリミティブを使う
    Direct,
    /// 一時的に chdir して getcwd で読み戻す
    ChangeDirectory,
}

/// `~` / `~/...` / `~user/...` を展開する
///
/// 解決できないユーザー名の場合は入力をそのまま返す。
pub fn expand_tilde(path: &str) -> String {
    if !path.starts_with('~') {
        return path.to_string();
    }

    let end = path.find('/').unwrap_or(path.len());
    let user = &path[1..end];

    if user.is_empty() {
        return shellexpand::tilde_with_context(path, || {
            dirs::home_dir().map(|home| home.to_string_lossy().into_owned())
        })
        .into_owned();
    }

    match User::from_name(user) {
        Ok(Some(account)) => {
            let mut expanded = account.dir.into_os_string().into_vec();
            expanded.extend_from_slice(path[end..].as_bytes());
            OsString::from_vec(expanded).to_string_lossy().into_owned()
        }
        _ => {
            log::debug!("no account for '~{}', leaving path unexpanded", user);
            path.to_string()
        }
    }
}

/// `Path` 版のチルダ展開（UTF-8 でないパスはそのまま）
pub fn expand_tilde_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(text) => PathBuf::from(expand_tilde(text)),
        None => path.to_path_buf(),
    }
}

/// 正規化された絶対パスを返す
///
/// 対象がディレクトリなら末尾 `/` 付き、存在しないファイルは新規ファイルとして
/// 正規化済みディレクトリに名前を連結する。途中のディレクトリに入れない場合は `None`。
pub fn full_path(path: impl AsRef<Path>) -> Option<PathBuf> {
    full_path_with(path, ResolveStrategy::Direct)
}

/// 方式を指定して正規化された絶対パスを返す
pub fn full_path_with(path: impl AsRef<Path>, strategy: ResolveStrategy) -> Option<PathBuf> {
    let target = expand_tilde_path(path.as_ref());
    let path_only = is_dir(&target);

    let mut target_bytes = target.into_os_string().into_vec();
    if path_only && target_bytes.last() != Some(&b'/') {
        target_bytes.push(b'/');
    }

    let Some(last_slash) = target_bytes.iter().rposition(|&b| b == b'/') else {
        // 素のファイル名は作業ディレクトリにある
        let mut result = current_dir_bytes(strategy);
        result.extend_from_slice(&target_bytes);
        return Some(PathBuf::from(OsString::from_vec(result)));
    };

    let just_filename = target_bytes.split_off(last_slash + 1);
    let directory = PathBuf::from(OsString::from_vec(target_bytes));

    let canonical = match strategy {
        ResolveStrategy::Direct => canonical_dir(&directory)?,
        ResolveStrategy::ChangeDirectory => canonical_dir_via_chdir(&directory)?,
    };

    let mut result = with_trailing_slash(canonical).into_os_string().into_vec();
    if !path_only {
        result.extend_from_slice(&just_filename);
    }

    Some(PathBuf::from(OsString::from_vec(result)))
}

fn canonical_dir(directory: &Path) -> Option<PathBuf> {
    match fs::canonicalize(directory) {
        Ok(canonical) => Some(canonical),
        Err(e) if e.kind() == ErrorKind::Unsupported => canonical_dir_via_chdir(directory),
        Err(e) => {
            log::debug!("cannot canonicalize {}: {}", directory.display(), e);
            None
        }
    }
}

/// chdir で対象へ移動し、getcwd で読み戻してから元の場所へ戻る
fn canonical_dir_via_chdir(directory: &Path) -> Option<PathBuf> {
    let _guard = CWD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let here = climb_to_existing_cwd()?;

    if env::set_current_dir(directory).is_err() {
        return None;
    }
    let resolved = env::current_dir().ok();

    // 戻れなくても打つ手はない
    let _ = env::set_current_dir(&here);

    resolved
}

/// 作業ディレクトリを移動する（正規化中の chdir とは交差しない）
pub fn change_directory(directory: &Path) -> Result<(), PathError> {
    let _guard = CWD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    env::set_current_dir(directory).map_err(|source| PathError::Inaccessible {
        path: directory.to_path_buf(),
        source,
    })?;
    log::debug!("changed working directory to {}", directory.display());
    Ok(())
}

/// getcwd が失敗する間は一つ上へ移動して再試行する
fn climb_to_existing_cwd() -> Option<PathBuf> {
    for _ in 0..MAX_CWD_CLIMB {
        if let Ok(here) = env::current_dir() {
            return Some(here);
        }
        let _ = env::set_current_dir("..");
    }
    env::current_dir().ok()
}

fn current_dir_bytes(strategy: ResolveStrategy) -> Vec<u8> {
    let here = match strategy {
        ResolveStrategy::Direct => env::current_dir().ok(),
        ResolveStrategy::ChangeDirectory => {
            let _guard = CWD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            climb_to_existing_cwd()
        }
    };

    match here {
        Some(dir) => with_trailing_slash(dir).into_os_string().into_vec(),
        None => Vec::new(),
    }
}

/// ルート以外のパスの末尾に `/` を付ける
pub fn with_trailing_slash(path: PathBuf) -> PathBuf {
    let mut bytes = path.into_os_string().into_vec();
    if bytes.last() != Some(&b'/') {
        bytes.push(b'/');
    }
    PathBuf::from(OsString::from_vec(bytes))
}

/// パスがディレクトリを指すか
pub fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.is_dir()).unwrap_or(false)
}

/// パスの最後の要素（表示用）
pub fn tail(path: &Path) -> String {
    let bytes = path.as_os_str().as_bytes();
    let start = bytes.iter().rposition(|&b| b == b'/').map_or(0, |pos| pos + 1);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

/// 閉じ込めルートの外側にあるかどうか
///
/// `allow_tabcomp` が真のとき、ルートへ伸びる途中の入力（ルートの前方部分）は
/// 内側とみなす。パスが解決できない場合は `allow_tabcomp` をそのまま返す。
pub fn outside_of_confinement(path: &Path, root: Option<&Path>, allow_tabcomp: bool) -> bool {
    let Some(root) = root else {
        return false;
    };

    let Some(full) = full_path(path) else {
        return allow_tabcomp;
    };

    let full = full.as_os_str().as_bytes();
    let root = root.as_os_str().as_bytes();

    let is_inside = full.starts_with(root);
    let begins_to_be = allow_tabcomp && root.starts_with(full);

    !is_inside && !begins_to_be
}

/// 閉じ込めルートの内側にあるかどうか
pub fn is_confined(path: &Path, root: &Path, allow_tabcomp: bool) -> bool {
    !outside_of_confinement(path, Some(root), allow_tabcomp)
}

/// 閉じ込めの外なら `PathError::OutsideConfinement` を返す
pub fn check_confinement(
    path: &Path,
    root: Option<&Path>,
    action: &'static str,
) -> Result<(), PathError> {
    match root {
        Some(root) if outside_of_confinement(path, Some(root), false) => {
            Err(PathError::OutsideConfinement {
                action,
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            })
        }
        _ => Ok(()),
    }
}

/// 親ディレクトリが存在し、入れることを確認する
///
/// `locking` が真なら書き込み可能性も確認する（失敗は軽い警告扱い）。
pub fn has_valid_path(filename: &Path, locking: bool) -> Result<(), PathError> {
    let parent = match filename.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("/"),
    };

    let meta = match fs::metadata(&parent) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PathError::MissingDirectory { path: parent });
        }
        Err(source) => return Err(PathError::Inaccessible { path: parent, source }),
    };

    if !meta.is_dir() {
        return Err(PathError::NotADirectory { path: parent });
    }
    if access(parent.as_path(), AccessFlags::X_OK).is_err() {
        return Err(PathError::NotSearchable { path: parent });
    }
    if locking && access(parent.as_path(), AccessFlags::W_OK).is_err() {
        return Err(PathError::NotWritable { path: parent });
    }

    Ok(())
}

/// 書き込み可能なディレクトリなら、その絶対パス（末尾 `/` 付き）を返す
pub fn check_writable_directory(path: &Path) -> Option<PathBuf> {
    let full = full_path(path)?;

    if full.as_os_str().as_bytes().last() != Some(&b'/') {
        return None;
    }
    if access(full.as_path(), AccessFlags::W_OK).is_err() {
        return None;
    }

    Some(full)
}
