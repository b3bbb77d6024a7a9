//! 日志初始化
//!
//! 开发环境输出可读文本，生产环境输出 JSON 行 (方便采集)。
//! `LOG_DIR` 设置且目录存在时按天滚动写文件，否则写 stdout。
//!
//! Dedicated targets:
//! - `security`: webhook signature failures
//! - `operator_alert`: revenue-affecting marketplace ingestion warnings

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Output format of the log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Text logs to stdout at `info`
pub fn init_logger() {
    init_logger_with_file(None, None, LogFormat::Text);
}

/// `RUST_LOG` wins over `log_level` when set. A second call is ignored,
/// so tests sharing a process can all call it.
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>, format: LogFormat) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},sqlx=warn,hyper=warn")));

    let writer = log_dir
        .map(Path::new)
        .filter(|p| p.is_dir())
        .map(|dir| tracing_appender::rolling::daily(dir, "order-server"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    // fmt builder 的类型随 writer / format 变化，只能分支 init
    let _ = match (format, writer) {
        (LogFormat::Text, None) => builder.try_init(),
        (LogFormat::Text, Some(w)) => builder.with_ansi(false).with_writer(w).try_init(),
        (LogFormat::Json, None) => builder.json().with_current_span(false).try_init(),
        (LogFormat::Json, Some(w)) => builder
            .json()
            .with_current_span(false)
            .with_writer(w)
            .try_init(),
    };
}
