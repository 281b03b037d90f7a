//! ロギングシステム
//!
//! `log` ファサードのバックエンド。stderr と任意のファイルへ出力する。

use log::{LevelFilter, Log, Metadata, Record};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// ロガー
///
/// * 開発者向け詳細ログを stderr へ出力
/// * ファイル出力先が設定されていれば追記する
#[derive(Debug, Clone)]
pub struct Logger {
    level: LevelFilter,
    output_stderr: bool,
    output_file: Option<PathBuf>,
}

impl Logger {
    /// デフォルト構築
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            output_stderr: true,
            output_file: None,
        }
    }

    /// 開発者向けロガー
    pub fn for_development() -> Self {
        Self::new(LevelFilter::Debug)
    }

    /// ログレベルを取得
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// ログレベルを変更
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// ファイル出力を設定
    pub fn with_file_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// 標準エラー出力を無効化
    pub fn without_stderr(mut self) -> Self {
        self.output_stderr = false;
        self
    }

    fn format_record(record: &Record<'_>) -> String {
        format!("{}: {} [{}]", record.level(), record.args(), record.target())
    }

    fn write_line(&self, message: &str) {
        if self.output_stderr {
            eprintln!("{}", message);
        }

        if let Some(path) = &self.output_file {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{}", message);
            }
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.write_line(&Self::format_record(record));
        }
    }

    fn flush(&self) {}
}

/// グローバルロガーを設定
///
/// 二回目以降の呼び出しは何もしない。
pub fn init(level: LevelFilter, file: Option<PathBuf>) {
    let mut logger = Logger::new(level);
    if let Some(path) = file {
        logger = logger.with_file_output(path);
    }

    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use tempfile::tempdir;

    #[test]
    fn logger_respects_log_level() {
        let logger = Logger::for_development().without_stderr();
        let debug = Metadata::builder().level(Level::Debug).build();
        let trace = Metadata::builder().level(Level::Trace).build();
        assert!(logger.enabled(&debug));
        assert!(!logger.enabled(&trace));

        let warn_logger = Logger::for_development()
            .with_level(LevelFilter::Warn)
            .without_stderr();
        let warn = Metadata::builder().level(Level::Warn).build();
        assert!(!warn_logger.enabled(&debug));
        assert!(warn_logger.enabled(&warn));
    }

    #[test]
    fn logger_appends_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.log");
        let logger = Logger::new(LevelFilter::Info)
            .without_stderr()
            .with_file_output(&path);

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("lock")
                .args(format_args!("lock skipped"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("lock")
                .args(format_args!("hidden"))
                .build(),
        );

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "WARN: lock skipped [lock]\n");
    }
}
