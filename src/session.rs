//! 編集セッション
//!
//! 設定・バッファリスト・書き込み器・ロック管理・フロントエンドをまとめ、
//! 外部から呼ばれる操作（開く・挿入・保存・閉じる・切り替え）を提供する。
//!
//! 失敗はフロントエンドへ適切なレベルで報告したうえで `Err` として返す。
//! ロック関連の失敗は報告のみで、編集は続行する。

use crate::buffer::{BufferId, BufferList, OpenBuffer, Region};
use crate::config::CoreConfig;
use crate::error::{BufferError, CoreError, MessageLevel, ReadError, Result};
use crate::file::lock::{LockManager, LockOutcome};
use crate::file::metadata::{LineFormat, StatSnapshot};
use crate::file::path::{
    change_directory, check_confinement, expand_tilde_path, full_path, has_valid_path,
    outside_of_confinement, tail,
};
use crate::file::reader::{check_file_kind, open_file, read_lines, OpenedFile};
use crate::file::writer::{self, BackupPolicy, FileWriter, WriteMode, WriteReport, WriteRequest};
use crate::frontend::{Answer, Frontend, Prompt};
use crate::signals::{interrupt_flag, InterruptGuard};
use nix::unistd::{access, AccessFlags};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `writeout` の結果
#[derive(Debug)]
pub enum SaveOutcome {
    /// 書き込んだ
    Written(WriteReport),
    /// 確認で「いいえ」が選ばれ、書き込まなかった
    Skipped,
    /// 確認が取り消された
    Cancelled,
}

impl SaveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SaveOutcome::Written(_))
    }
}

/// 編集セッション
pub struct EditorSession<F: Frontend> {
    config: CoreConfig,
    buffers: BufferList,
    writer: FileWriter,
    locks: LockManager,
    frontend: F,
}

impl<F: Frontend> EditorSession<F> {
    /// 設定を検証してセッションを作る（バッファはまだない）
    pub fn new(config: CoreConfig, frontend: F) -> Result<Self> {
        let config = config.resolve()?;

        let writer = FileWriter::new(
            BackupPolicy {
                enabled: config.backup,
                dir: config.backup_dir.clone(),
                insecure: config.insecure_backup,
            },
            config.operating_dir.clone(),
        );
        let locks = LockManager::new(
            &config.lock_prefix,
            &config.lock_suffix,
            config.insecure_backup,
            &config.program_name,
        );

        log::debug!(
            "session ready (backup: {}, locking: {}, confined: {})",
            config.backup,
            config.locking,
            config.operating_dir.is_some()
        );

        Ok(Self {
            config,
            buffers: BufferList::new(),
            writer,
            locks,
            frontend,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn buffers(&self) -> &BufferList {
        &self.buffers
    }

    pub fn current_buffer(&self) -> Option<&OpenBuffer> {
        self.buffers.current()
    }

    pub fn current_buffer_mut(&mut self) -> Option<&mut OpenBuffer> {
        self.buffers.current_mut()
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    /// チルダ展開して絶対パスにする
    pub fn resolve_path(&self, name: impl AsRef<Path>) -> Option<PathBuf> {
        full_path(expand_tilde_path(name.as_ref()))
    }

    /// 閉じ込めディレクトリの外かどうか
    pub fn is_outside(&self, name: impl AsRef<Path>, allow_tabcomp: bool) -> bool {
        outside_of_confinement(
            &expand_tilde_path(name.as_ref()),
            self.config.operating_dir.as_deref(),
            allow_tabcomp,
        )
    }

    /// 閉じ込めディレクトリへ移動する（設定がなければ何もしない）
    pub fn enter_operating_dir(&self) -> Result<()> {
        if let Some(root) = self.config.operating_dir.as_deref() {
            change_directory(root)?;
        }
        Ok(())
    }

    /// ファイルを開く
    ///
    /// `new_buffer` が真なら新しいバッファに、偽なら現在のバッファのカーソル位置に
    /// 読み込む。空の名前は名前のない新規バッファになる。既存のロックを上書き
    /// しなかった場合は `Ok(false)`。
    ///
    /// 読み込みが途中で失敗・中断した場合は、読めた行をバッファに残したまま
    /// `CoreError::Read` を返す。
    pub fn open_buffer(&mut self, filename: impl AsRef<Path>, new_buffer: bool) -> Result<bool> {
        let filename = filename.as_ref();
        let named = !filename.as_os_str().is_empty();
        let realname = expand_tilde_path(filename);

        if named {
            let root = self.config.operating_dir.as_deref();
            if let Err(e) = check_confinement(&realname, root, "read file from") {
                return self.fail(e);
            }
            if let Err(e) = check_file_kind(&realname) {
                return self.fail(e);
            }
        }

        if !new_buffer && self.buffers.is_empty() {
            return self.fail(BufferError::NoBuffer);
        }

        if new_buffer {
            let id = self.buffers.create_buffer();

            if named {
                match has_valid_path(&realname, self.config.locking) {
                    Ok(()) if self.config.locking => {
                        if !self.lock_file(id, &realname) {
                            self.discard_current();
                            return Ok(false);
                        }
                    }
                    Ok(()) => {}
                    Err(e) => self.report_error(&e.into()),
                }
            }
        }

        let opened = if named && !self.config.no_read {
            open_file(&realname, new_buffer)
        } else {
            Ok(OpenedFile::New)
        };

        let mut unfinished = None;

        match opened {
            Ok(OpenedFile::Existing { file, path }) => {
                log::debug!("reading {}", path.display());
                unfinished = self.install_read(file, &realname, new_buffer)?;

                if let Some(buffer) = self.buffers.current_mut() {
                    if buffer.stat.is_none() {
                        buffer.stat = StatSnapshot::capture(&realname).ok();
                    }
                }
            }
            Ok(OpenedFile::New) => {
                if named && !self.config.no_read {
                    self.frontend.report(MessageLevel::Info, "New File");
                }
            }
            Err(e) => {
                if new_buffer {
                    self.discard_current();
                }
                return self.fail(e);
            }
        }

        if new_buffer {
            if let Some(buffer) = self.buffers.current_mut() {
                buffer.filename = realname;
                buffer.cursor.move_to_origin();
            }
        }

        self.frontend.refresh_display();
        match unfinished {
            Some(error) => Err(error.into()),
            None => Ok(true),
        }
    }

    /// 現在のバッファのカーソル位置にファイルを挿入する
    ///
    /// `multibuffer` 設定時は新しいバッファに開く。挿入ではバッファの
    /// 改行形式は変わらない。
    pub fn insert_file(&mut self, filename: impl AsRef<Path>) -> Result<bool> {
        let realname = expand_tilde_path(filename.as_ref());

        if self.config.multibuffer {
            return self.open_buffer(&realname, true);
        }

        let Some(buffer) = self.buffers.current() else {
            return self.fail(BufferError::NoBuffer);
        };
        let was_cursor = buffer.cursor;
        let was_format = buffer.format;

        let opened = self.open_buffer(&realname, false);

        let moved = match self.buffers.current_mut() {
            Some(buffer) => {
                buffer.format = was_format;
                buffer.cursor != was_cursor
            }
            None => false,
        };
        if moved {
            self.set_modified();
        }

        opened
    }

    /// 変更済みにする
    ///
    /// 初めて変更済みになったとき、ロックファイルにも変更の印を付ける。
    pub fn set_modified(&mut self) {
        let Some(buffer) = self.buffers.current_mut() else {
            return;
        };
        if buffer.modified {
            return;
        }
        buffer.modified = true;

        let lock = match (&buffer.lock_path, self.config.locking && buffer.is_named()) {
            (Some(lock_path), true) => Some((
                lock_path.clone(),
                full_path(&buffer.filename).unwrap_or_else(|| buffer.filename.clone()),
            )),
            _ => None,
        };

        if let Some((lock_path, target)) = lock {
            if let Err(e) = self.locks.mark_modified(&lock_path, &target) {
                self.report_error(&e.into());
            }
        }

        self.frontend.refresh_display();
    }

    /// バッファ全体を書き込む（確認なし）
    ///
    /// 上書きの場合、バッファのファイル名・stat を更新して未変更に戻す。
    pub fn write_buffer(
        &mut self,
        name: impl AsRef<Path>,
        mode: WriteMode,
    ) -> Result<WriteReport> {
        let id = self.current_id()?;
        let report = self.write_with(name.as_ref(), mode, false, None)?;

        if mode == WriteMode::Overwrite {
            if let Some(buffer) = self.buffers.get_mut(id) {
                buffer.filename = report.path.clone();
                if report.stat.is_some() {
                    buffer.stat = report.stat;
                }
                buffer.modified = false;
            }
            self.frontend.mark_saved(id);
        }

        self.frontend
            .report(MessageLevel::Info, &report.status_message());
        self.frontend.refresh_display();
        Ok(report)
    }

    /// 範囲だけを書き込む
    ///
    /// 範囲の最後の行が空でなければ改行を補う。バッファの状態は変えない。
    pub fn write_region(
        &mut self,
        name: impl AsRef<Path>,
        region: Region,
        mode: WriteMode,
    ) -> Result<WriteReport> {
        let report = self.write_with(name.as_ref(), mode, false, Some(region))?;
        self.frontend
            .report(MessageLevel::Info, &report.status_message());
        Ok(report)
    }

    /// 他人に読めない一時ファイルとして書き出す（既存のファイルは上書きしない）
    pub fn write_temporary(&mut self, name: impl AsRef<Path>) -> Result<WriteReport> {
        self.write_with(name.as_ref(), WriteMode::Overwrite, true, None)
    }

    /// 既に開いているストリームへ書き出し、行数を返す
    pub fn write_to_stream<W: Write>(&self, stream: &mut W) -> Result<usize> {
        let buffer = self.buffers.current().ok_or(BufferError::NoBuffer)?;
        Ok(writer::write_to_stream(stream, &buffer.lines, buffer.format)?)
    }

    /// 確認付きの保存
    ///
    /// 上書きの場合、別名での保存・既存ファイルの上書き・ディスク上の変更を
    /// フロントエンドに確認してから書き込む。
    pub fn writeout(&mut self, name: impl AsRef<Path>, mode: WriteMode) -> Result<SaveOutcome> {
        let name = name.as_ref();

        if mode == WriteMode::Overwrite {
            if let Some(outcome) = self.confirm_overwrite(name)? {
                return Ok(outcome);
            }
        }

        self.write_buffer(name, mode).map(SaveOutcome::Written)
    }

    /// バッファ自身の名前で保存する
    pub fn save(&mut self) -> Result<SaveOutcome> {
        let filename = match self.buffers.current() {
            Some(buffer) if buffer.is_named() => buffer.filename.clone(),
            Some(_) => return self.fail(BufferError::Unnamed),
            None => return self.fail(BufferError::NoBuffer),
        };
        self.writeout(filename, WriteMode::Overwrite)
    }

    /// 現在のバッファを閉じ、ロックを解放する
    ///
    /// 直前のバッファが現在のバッファになる。
    pub fn close_buffer(&mut self) -> Result<OpenBuffer> {
        let closed = match self.buffers.close_current() {
            Ok(closed) => closed,
            Err(e) => return self.fail(e),
        };

        self.release_lock(&closed);
        log::info!("closed buffer {}", closed.filename.display());

        self.mention_name_and_linecount();
        self.frontend.refresh_display();
        Ok(closed)
    }

    pub fn switch_to_next_buffer(&mut self) -> Result<()> {
        self.switch_buffer(true)
    }

    pub fn switch_to_prev_buffer(&mut self) -> Result<()> {
        self.switch_buffer(false)
    }

    /// 現在のバッファの名前と行数を表示する
    pub fn mention_name_and_linecount(&mut self) {
        let Some(buffer) = self.buffers.current() else {
            return;
        };

        let name = if buffer.is_named() {
            tail(&buffer.filename)
        } else {
            "New Buffer".to_string()
        };
        let count = buffer.lines.reported_line_count();
        let noun = if count == 1 { "line" } else { "lines" };

        let message = match buffer.format.label() {
            Some(label) => format!("{} -- {} {} ({})", name, count, noun, label),
            None => format!("{} -- {} {}", name, count, noun),
        };
        self.frontend.report(MessageLevel::Hush, &message);
    }

    fn switch_buffer(&mut self, to_next: bool) -> Result<()> {
        if self.buffers.is_empty() {
            return self.fail(BufferError::NoBuffer);
        }
        if self.buffers.is_single() {
            self.frontend
                .report(MessageLevel::Mild, "No more open file buffers");
            return Ok(());
        }

        let switched = if to_next {
            self.buffers.switch_next()
        } else {
            self.buffers.switch_prev()
        };
        if let Err(e) = switched {
            return self.fail(e);
        }

        // 折り返し表示でなければ横スクロール位置は引き継がない
        let softwrap = self.config.softwrap;
        if let Some(buffer) = self.buffers.current_mut() {
            if !softwrap {
                buffer.first_column = 0;
            }
        }

        self.mention_name_and_linecount();
        self.frontend.refresh_display();
        Ok(())
    }

    /// 上書き保存前の確認（書き込まない場合は結果を返す）
    fn confirm_overwrite(&mut self, name: &Path) -> Result<Option<SaveOutcome>> {
        let buffer = self.buffers.current().ok_or(BufferError::NoBuffer)?;

        let answer = expand_tilde_path(name);
        let full_answer = full_path(&answer).unwrap_or_else(|| answer.clone());
        let on_disk = StatSnapshot::capture(&full_answer).ok();

        let named = buffer.is_named();
        let do_warning = if named {
            let full_filename = full_path(&buffer.filename).unwrap_or_else(|| buffer.filename.clone());
            full_filename != full_answer
        } else {
            on_disk.is_some()
        };
        let snapshot = buffer.stat;

        if do_warning {
            if named && self.frontend.ask(&Prompt::SaveUnderDifferentName) != Answer::Yes {
                return Ok(Some(SaveOutcome::Skipped));
            }
            if on_disk.is_some()
                && self.frontend.ask(&Prompt::OverwriteExisting { path: name }) != Answer::Yes
            {
                return Ok(Some(SaveOutcome::Skipped));
            }
        } else if let (Some(current), Some(snapshot)) = (on_disk, snapshot) {
            if snapshot.changed_on_disk(&current) {
                log::warn!("{} changed on disk since it was read", full_answer.display());
                self.frontend
                    .report(MessageLevel::Alert, "File on disk has changed");

                match self.frontend.ask(&Prompt::ModifiedSinceOpen) {
                    Answer::Yes => {}
                    Answer::No => return Ok(Some(SaveOutcome::Skipped)),
                    Answer::Cancel => return Ok(Some(SaveOutcome::Cancelled)),
                }
            }
        }

        Ok(None)
    }

    fn write_with(
        &mut self,
        target: &Path,
        mode: WriteMode,
        temporary: bool,
        region: Option<Region>,
    ) -> Result<WriteReport> {
        let id = self.current_id()?;
        let buffer = self.buffers.get(id).ok_or(BufferError::NoBuffer)?;

        let partition = match region.map(|region| buffer.lines.extract_region(region)) {
            Some(Ok(mut partition)) => {
                partition.ensure_trailing_blank();
                Some(partition)
            }
            Some(Err(e)) => return self.fail(e),
            None => None,
        };

        let request = WriteRequest::new(
            target,
            partition.as_ref().unwrap_or(&buffer.lines),
            buffer.format,
        )
        .mode(mode)
        .temporary(temporary)
        .snapshot(buffer.stat.as_ref())
        .region(region.is_some());

        let frontend = &mut self.frontend;
        let result = self.writer.write(&request, |backup| {
            frontend.ask(&Prompt::BackupFailed { backup }) == Answer::Yes
        });

        match result {
            Ok(report) => Ok(report),
            Err(e) => self.fail(e),
        }
    }

    /// 読み込んだ内容をカーソル位置に取り込み、結果を表示する
    ///
    /// 読み込みが完了しなかった場合はそのエラーを返す（報告済み）。
    fn install_read(
        &mut self,
        file: File,
        realname: &Path,
        new_buffer: bool,
    ) -> Result<Option<ReadError>> {
        let outcome = {
            let _interrupt = InterruptGuard::arm();
            read_lines(&file, self.config.no_convert, interrupt_flag())
        };
        drop(file);

        let writable = !new_buffer
            || self.config.view_mode
            || access(realname, AccessFlags::W_OK).is_ok();
        let status = outcome.status_message();
        let format = outcome.format;

        let Some(buffer) = self.buffers.current_mut() else {
            return self.fail(BufferError::NoBuffer);
        };
        let end = match buffer.lines.ingraft(buffer.cursor, outcome.store) {
            Ok(end) => end,
            Err(e) => return self.fail(e),
        };
        buffer.cursor = end;

        if new_buffer {
            buffer.format = format;
        }
        if self.config.make_it_unix {
            buffer.format = LineFormat::Unix;
        }

        log::info!(
            "read {} lines from {} ({:?})",
            outcome.lines_read,
            realname.display(),
            format
        );

        let unfinished = outcome.error;
        if let Some(error) = &unfinished {
            log::warn!("{}", error);
            self.frontend.report(MessageLevel::Alert, &error.to_string());
        } else if writable {
            self.frontend.report(MessageLevel::Hush, &status);
        } else {
            let message = format!("File '{}' is unwritable", realname.display());
            self.frontend.report(MessageLevel::Alert, &message);
        }
        Ok(unfinished)
    }

    /// ロックを取る（既存のロックを上書きしないと決めた場合は偽）
    fn lock_file(&mut self, id: BufferId, realname: &Path) -> bool {
        let target = full_path(realname).unwrap_or_else(|| realname.to_path_buf());

        let frontend = &mut self.frontend;
        let outcome = self.locks.acquire(&target, |record| {
            frontend.ask(&Prompt::LockOverride {
                path: realname,
                record,
            }) == Answer::Yes
        });

        match outcome {
            LockOutcome::Created(lock_path) => {
                if let Some(buffer) = self.buffers.get_mut(id) {
                    buffer.lock_path = Some(lock_path);
                }
                true
            }
            LockOutcome::Declined => false,
            LockOutcome::Skipped(e) => {
                self.report_error(&e.into());
                true
            }
        }
    }

    /// 開き損ねた新しいバッファを片付ける
    ///
    /// 他にバッファがあれば閉じ、唯一のバッファなら空の無名バッファとして残す。
    fn discard_current(&mut self) {
        if self.buffers.is_single() {
            if let Some(buffer) = self.buffers.current_mut() {
                let leftover = std::mem::take(buffer);
                self.release_lock(&leftover);
            }
        } else if let Ok(closed) = self.buffers.close_current() {
            self.release_lock(&closed);
        }
    }

    fn release_lock(&mut self, buffer: &OpenBuffer) {
        if let Some(lock_path) = &buffer.lock_path {
            if let Err(e) = self.locks.release(lock_path) {
                self.report_error(&e.into());
            }
        }
    }

    fn current_id(&self) -> std::result::Result<BufferId, BufferError> {
        self.buffers.current_id().ok_or(BufferError::NoBuffer)
    }

    fn report_error(&mut self, error: &CoreError) {
        log::warn!("{}", error);
        self.frontend.report(error.level(), &error.to_string());
    }

    fn fail<T>(&mut self, error: impl Into<CoreError>) -> Result<T> {
        let error = error.into();
        self.report_error(&error);
        Err(error)
    }
}

impl<F: Frontend> Drop for EditorSession<F> {
    fn drop(&mut self) {
        for buffer in self.buffers.drain() {
            if let Some(lock_path) = buffer.lock_path {
                if let Err(e) = self.locks.release(&lock_path) {
                    log::warn!("{}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::CursorPosition;
    use crate::frontend::HeadlessFrontend;
    use std::fs;
    use tempfile::tempdir;

    fn new_session(config: CoreConfig) -> EditorSession<HeadlessFrontend> {
        EditorSession::new(config, HeadlessFrontend::default()).unwrap()
    }

    fn contents(session: &EditorSession<HeadlessFrontend>) -> Vec<u8> {
        let mut out = Vec::new();
        session.write_to_stream(&mut out).unwrap();
        out
    }

    #[test]
    fn test_open_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "alpha\r\nbeta\r\n").unwrap();

        let mut session = new_session(CoreConfig::default());
        assert!(session.open_buffer(&path, true).unwrap());

        let buffer = session.current_buffer().unwrap();
        assert_eq!(buffer.filename, path);
        assert_eq!(buffer.format, LineFormat::Dos);
        assert_eq!(buffer.cursor, CursorPosition::new());
        assert!(buffer.stat.is_some());
        assert!(!buffer.modified);
        assert_eq!(
            session.frontend().last_message(),
            Some("Read 2 lines (Converted from DOS format)")
        );
    }

    #[test]
    fn test_open_missing_file_is_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fresh.txt");

        let mut session = new_session(CoreConfig::default());
        assert!(session.open_buffer(&path, true).unwrap());
        assert_eq!(session.frontend().last_message(), Some("New File"));
        assert_eq!(session.current_buffer().unwrap().filename, path);
        assert!(session.current_buffer().unwrap().stat.is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_read_is_returned_to_caller() {
        // 先頭ページは読めないため、開けても読み込みは EIO で失敗する
        let unreadable = Path::new("/proc/self/mem");

        let mut session = new_session(CoreConfig::default());
        let err = session.open_buffer(unreadable, true).unwrap_err();
        assert!(matches!(err, CoreError::Read(ReadError::Io { lines_read: 0, .. })));
        assert!(!err.is_interrupted());

        // バッファは残り、名前も付く
        assert_eq!(session.buffers().len(), 1);
        assert_eq!(session.current_buffer().unwrap().filename, unreadable);

        let messages = session.frontend().messages();
        assert!(!messages.iter().any(|(_, m)| m.starts_with("Read ")));
        assert_eq!(messages.last().unwrap().0, MessageLevel::Alert);

        // 挿入でも同じく失敗が返る
        session.frontend_mut().clear();
        let err = session.insert_file(unreadable).unwrap_err();
        assert!(matches!(err, CoreError::Read(_)));
        assert!(!session
            .frontend()
            .messages()
            .iter()
            .any(|(_, m)| m.starts_with("Read ")));
    }

    #[test]
    fn test_open_directory_is_rejected() {
        let dir = tempdir().unwrap();
        let mut session = new_session(CoreConfig::default());

        let err = session.open_buffer(dir.path(), true).unwrap_err();
        assert!(matches!(err, CoreError::Open(_)));
        assert!(session.buffers().is_empty());
        assert!(session.frontend().last_message().unwrap().contains("is a directory"));
    }

    #[test]
    fn test_insert_file_keeps_format_and_marks_modified() {
        let dir = tempdir().unwrap();
        let main = dir.path().join("main.txt");
        let extra = dir.path().join("extra.txt");
        fs::write(&main, "one\ntwo\n").unwrap();
        fs::write(&extra, "x\r\ny\r\n").unwrap();

        let mut session = new_session(CoreConfig::default());
        session.open_buffer(&main, true).unwrap();
        session.current_buffer_mut().unwrap().cursor = CursorPosition::at(1, 0);

        assert!(session.insert_file(&extra).unwrap());

        let buffer = session.current_buffer().unwrap();
        assert_eq!(buffer.format, LineFormat::Unix);
        assert!(buffer.modified);
        assert_eq!(buffer.cursor, CursorPosition::at(3, 0));
        assert_eq!(contents(&session), b"one\nx\ny\ntwo\n");
    }

    #[test]
    fn test_insert_missing_file_fails() {
        let dir = tempdir().unwrap();
        let mut session = new_session(CoreConfig::default());
        session.open_buffer("", true).unwrap();

        let err = session.insert_file(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, CoreError::Open(_)));
        assert!(!session.current_buffer().unwrap().modified);
    }

    #[test]
    fn test_save_round_trip_and_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "a\rb\r").unwrap();

        let mut session = new_session(CoreConfig::default());
        session.open_buffer(&path, true).unwrap();
        session.set_modified();

        let outcome = session.save().unwrap();
        assert!(outcome.is_written());
        assert_eq!(fs::read(&path).unwrap(), b"a\rb\r");

        let id = session.buffers().current_id().unwrap();
        assert!(!session.current_buffer().unwrap().modified);
        assert_eq!(session.frontend().save_points(), &[id]);
        assert_eq!(session.frontend().last_message(), Some("Wrote 2 lines"));
    }

    #[test]
    fn test_save_unnamed_buffer_fails() {
        let mut session = new_session(CoreConfig::default());
        session.open_buffer("", true).unwrap();
        let err = session.save().unwrap_err();
        assert!(matches!(err, CoreError::Buffer(BufferError::Unnamed)));
    }

    #[test]
    fn test_writeout_under_different_name_asks_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let other = dir.path().join("b.txt");
        fs::write(&path, "a\n").unwrap();
        fs::write(&other, "b\n").unwrap();

        let mut session = new_session(CoreConfig::default());
        session.open_buffer(&path, true).unwrap();

        // 別名を断る
        let outcome = session.writeout(&other, WriteMode::Overwrite).unwrap();
        assert!(matches!(outcome, SaveOutcome::Skipped));
        assert_eq!(fs::read(&other).unwrap(), b"b\n");

        // 別名も上書きも承諾する
        session.frontend_mut().push_answer(Answer::Yes);
        session.frontend_mut().push_answer(Answer::Yes);
        let outcome = session.writeout(&other, WriteMode::Overwrite).unwrap();
        assert!(outcome.is_written());
        assert_eq!(fs::read(&other).unwrap(), b"a\n");
        assert_eq!(session.current_buffer().unwrap().filename, other);

        let prompts = session.frontend().prompts();
        assert_eq!(prompts.last().unwrap(), &format!("File \"{}\" exists; OVERWRITE? ", other.display()));
    }

    #[test]
    fn test_writeout_detects_change_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.txt");
        fs::write(&path, "mine\n").unwrap();

        let mut session = new_session(CoreConfig::default());
        session.open_buffer(&path, true).unwrap();

        // 別プロセスによる置き換え（inode が変わる）
        let replacement = dir.path().join("replacement");
        fs::write(&replacement, "theirs\n").unwrap();
        fs::rename(&replacement, &path).unwrap();

        session.frontend_mut().push_answer(Answer::Cancel);
        let outcome = session.save().unwrap();
        assert!(matches!(outcome, SaveOutcome::Cancelled));
        assert_eq!(fs::read(&path).unwrap(), b"theirs\n");
        assert!(session
            .frontend()
            .messages()
            .iter()
            .any(|(_, message)| message == "File on disk has changed"));

        session.frontend_mut().push_answer(Answer::Yes);
        assert!(session.save().unwrap().is_written());
        assert_eq!(fs::read(&path).unwrap(), b"mine\n");
    }

    #[test]
    fn test_write_region_adds_magic_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("src.txt");
        let out = dir.path().join("part.txt");
        fs::write(&path, "first\nsecond\nthird\n").unwrap();

        let mut session = new_session(CoreConfig::default());
        session.open_buffer(&path, true).unwrap();

        let region = Region::new(CursorPosition::at(0, 2), CursorPosition::at(1, 3));
        let report = session.write_region(&out, region, WriteMode::Overwrite).unwrap();
        assert_eq!(report.lines_written, 2);
        assert_eq!(fs::read(&out).unwrap(), b"rst\nsec\n");
        assert_eq!(session.current_buffer().unwrap().filename, path);
    }

    #[test]
    fn test_write_temporary_refuses_existing() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("exists");
        fs::write(&existing, "keep").unwrap();

        let mut session = new_session(CoreConfig::default());
        session.open_buffer("", true).unwrap();

        assert!(session.write_temporary(&existing).is_err());
        assert_eq!(fs::read(&existing).unwrap(), b"keep");

        let fresh = dir.path().join("fresh");
        session.write_temporary(&fresh).unwrap();
        assert!(fresh.exists());
        assert!(!session.current_buffer().unwrap().is_named());
    }

    #[test]
    fn test_confinement_rejects_outside_reads_and_writes() {
        let root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let outside_file = outside.path().join("secret.txt");
        fs::write(&outside_file, "secret").unwrap();

        let config = CoreConfig {
            operating_dir: Some(root.path().to_path_buf()),
            ..CoreConfig::default()
        };
        let mut session = new_session(config);

        let err = session.open_buffer(&outside_file, true).unwrap_err();
        assert!(matches!(err, CoreError::Path(_)));
        assert!(session.frontend().last_message().unwrap().starts_with("Can't read file from outside of"));

        session.open_buffer(root.path().join("inside.txt"), true).unwrap();
        let err = session
            .write_buffer(&outside_file, WriteMode::Overwrite)
            .unwrap_err();
        assert!(matches!(err, CoreError::Path(_)));
        assert_eq!(fs::read(&outside_file).unwrap(), b"secret");
        assert!(session.is_outside(&outside_file, false));
        assert!(!session.is_outside(root.path().join("x"), false));
    }

    #[test]
    fn test_locking_creates_and_releases_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locked.txt");
        fs::write(&path, "data\n").unwrap();

        let config = CoreConfig {
            locking: true,
            ..CoreConfig::default()
        };
        let mut session = new_session(config);
        session.open_buffer(&path, true).unwrap();

        let lock_path = session.current_buffer().unwrap().lock_path.clone().unwrap();
        assert!(lock_path.exists());

        session.set_modified();
        let record = session.locks.inspect(&lock_path).unwrap().unwrap();
        assert!(record.modified);

        drop(session);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_declined_lock_discards_new_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("busy.txt");
        fs::write(&path, "data\n").unwrap();

        let config = CoreConfig {
            locking: true,
            ..CoreConfig::default()
        };
        let mut first = new_session(config.clone());
        first.open_buffer(&path, true).unwrap();

        let mut second = new_session(config);
        second.open_buffer("", true).unwrap();
        assert!(!second.open_buffer(&path, true).unwrap());
        assert_eq!(second.buffers().len(), 1);
        assert!(!second.current_buffer().unwrap().is_named());
        assert!(second.frontend().prompts()[0].contains("is being edited"));
    }

    #[test]
    fn test_switching_buffers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("two.txt");
        fs::write(&path, "1\r\n2\r\n").unwrap();

        let mut session = new_session(CoreConfig::default());
        session.open_buffer("", true).unwrap();
        session.switch_to_next_buffer().unwrap();
        assert_eq!(session.frontend().last_message(), Some("No more open file buffers"));

        session.open_buffer(&path, true).unwrap();
        session.current_buffer_mut().unwrap().first_column = 7;

        session.switch_to_prev_buffer().unwrap();
        assert_eq!(session.frontend().last_message(), Some("New Buffer -- 0 lines"));

        session.switch_to_next_buffer().unwrap();
        assert_eq!(session.frontend().last_message(), Some("two.txt -- 2 lines (DOS)"));
        assert_eq!(session.current_buffer().unwrap().first_column, 0);
    }

    #[test]
    fn test_close_buffer() {
        let mut session = new_session(CoreConfig::default());
        session.open_buffer("", true).unwrap();
        session.open_buffer("", true).unwrap();

        session.close_buffer().unwrap();
        assert_eq!(session.buffers().len(), 1);

        let err = session.close_buffer().unwrap_err();
        assert!(matches!(err, CoreError::Buffer(BufferError::LastBuffer)));
    }

    #[test]
    fn test_make_it_unix_and_no_convert() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dos.txt");
        fs::write(&path, "a\r\nb\r\n").unwrap();

        let mut session = new_session(CoreConfig {
            make_it_unix: true,
            ..CoreConfig::default()
        });
        session.open_buffer(&path, true).unwrap();
        assert_eq!(session.current_buffer().unwrap().format, LineFormat::Unix);
        assert_eq!(contents(&session), b"a\nb\n");

        let mut raw = new_session(CoreConfig {
            no_convert: true,
            ..CoreConfig::default()
        });
        raw.open_buffer(&path, true).unwrap();
        assert_eq!(contents(&raw), b"a\r\nb\r\n");
    }
}
