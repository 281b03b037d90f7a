//! シグナル制御
//!
//! ファイル入出力の間だけ画面リサイズシグナルを保留し、
//! 読み込み・オープンの間だけ Ctrl-C による中断を受け付ける。

use nix::libc::c_int;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

static CONTROL_C_WAS_PRESSED: AtomicBool = AtomicBool::new(false);

extern "C" fn catch_control_c(_signal: c_int) {
    CONTROL_C_WAS_PRESSED.store(true, Ordering::SeqCst);
}

/// 読み込みループが参照する中断フラグ
pub fn interrupt_flag() -> &'static AtomicBool {
    &CONTROL_C_WAS_PRESSED
}

/// SIGINT ハンドラを一時的に差し替えるガード
///
/// 生存中は SIGINT でフラグが立ち、ブロック中のシステムコールは EINTR で戻る
/// （`SA_RESTART` を付けない）。破棄時に元のハンドラへ戻す。
pub struct InterruptGuard {
    previous: Option<SigAction>,
}

impl InterruptGuard {
    pub fn arm() -> Self {
        CONTROL_C_WAS_PRESSED.store(false, Ordering::SeqCst);

        let action = SigAction::new(
            SigHandler::Handler(catch_control_c),
            SaFlags::empty(),
            SigSet::empty(),
        );

        // ハンドラはアトミック変数への書き込みのみ
        let previous = match unsafe { signal::sigaction(Signal::SIGINT, &action) } {
            Ok(previous) => Some(previous),
            Err(e) => {
                log::debug!("could not arm Ctrl-C handler: {}", e);
                None
            }
        };

        Self { previous }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = unsafe { signal::sigaction(Signal::SIGINT, &previous) };
        }
    }
}

/// SIGWINCH を保留するガード
///
/// 破棄時に保留を解くのは、このガードが保留を始めた場合だけ。
pub struct ResizeBlock {
    unblock_on_drop: bool,
}

impl ResizeBlock {
    pub fn new() -> Self {
        let mut previous = SigSet::empty();
        let unblock_on_drop = match signal::pthread_sigmask(
            SigmaskHow::SIG_BLOCK,
            Some(&resize_set()),
            Some(&mut previous),
        ) {
            Ok(()) => !previous.contains(Signal::SIGWINCH),
            Err(e) => {
                log::debug!("could not block SIGWINCH: {}", e);
                false
            }
        };
        Self { unblock_on_drop }
    }
}

impl Default for ResizeBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResizeBlock {
    fn drop(&mut self) {
        if self.unblock_on_drop {
            let _ = signal::pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&resize_set()), None);
        }
    }
}

fn resize_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGWINCH);
    set
}
