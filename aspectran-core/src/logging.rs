//! 日志初始化
//!
//! 引擎只通过 `tracing` 宏输出日志，由应用在启动时安装订阅者。配置可以来自
//! `aspectran.logging.*` 配置项，也可以来自进程环境变量 `LOG_LEVEL` / `LOG_FORMAT` / `RUST_LOG`。

use crate::config::Environment;
use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

const KEY_PREFIX: &str = "aspectran.logging";

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("Unknown log level '{}'", other)),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 单行紧凑输出（默认）
    Compact,
    Full,
    /// 每个事件一行 JSON
    Json,
    /// 多行，适合开发时阅读
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("Unknown log format '{}'", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// 未被过滤指令覆盖时的默认级别
    pub level: LogLevel,

    pub format: LogFormat,

    pub show_timestamp: bool,

    /// 输出事件的目标（模块路径）
    pub show_target: bool,

    pub show_thread_ids: bool,

    pub show_thread_names: bool,

    /// `EnvFilter` 指令，例如 `"aspectran_core::advice=debug,app_demo=trace"`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_timestamp: true,
            show_target: false,
            show_thread_ids: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_timestamp(mut self, show: bool) -> Self {
        self.show_timestamp = show;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_thread_names(mut self, show: bool) -> Self {
        self.show_thread_names = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从进程环境变量读取，无法识别的值保留默认设置
    pub fn from_env() -> Self {
        let lenient = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            level: lenient("LOG_LEVEL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.level),
            format: lenient("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.format),
            filter: lenient("RUST_LOG"),
            ..defaults
        }
    }

    /// 从 `aspectran.logging.*` 配置读取
    ///
    /// 与 [`from_env`](Self::from_env) 不同，级别或格式无法识别时返回错误。
    pub fn from_environment(env: &Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let flag = |name: &str, default: bool| env.get_bool_or(&format!("{}.{}", KEY_PREFIX, name), default);
        Ok(Self {
            level: setting(env, "level")?.unwrap_or(defaults.level),
            format: setting(env, "format")?.unwrap_or(defaults.format),
            show_timestamp: flag("show-timestamp", defaults.show_timestamp),
            show_target: flag("show-target", defaults.show_target),
            show_thread_ids: flag("show-thread-ids", defaults.show_thread_ids),
            show_thread_names: flag("show-thread-names", defaults.show_thread_names),
            filter: env.get_string(&format!("{}.filter", KEY_PREFIX)),
        })
    }

    /// 过滤器：显式指令优先，其次 `RUST_LOG`，两者中无法解析的指令被忽略
    pub fn env_filter(&self) -> EnvFilter {
        let builder = EnvFilter::builder().with_default_directive(LevelFilter::from(self.level).into());
        match &self.filter {
            Some(directives) => builder.parse_lossy(directives),
            None => builder.from_env_lossy(),
        }
    }

    fn format_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_thread_names(self.show_thread_names);
        match (self.format, self.show_timestamp) {
            (LogFormat::Json, _) => layer.json().boxed(),
            (LogFormat::Pretty, _) => layer.pretty().boxed(),
            (LogFormat::Compact, true) => layer.compact().boxed(),
            (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
            (LogFormat::Full, true) => layer.boxed(),
            (LogFormat::Full, false) => layer.without_time().boxed(),
        }
    }

    /// 安装全局订阅者；已经安装过时返回 [`ConfigError::LoggingInitFailed`]
    pub fn init(self) -> Result<(), ConfigError> {
        let filter = self.env_filter();
        tracing_subscriber::registry()
            .with(self.format_layer().with_filter(filter))
            .try_init()
            .map_err(|e| ConfigError::LoggingInitFailed(e.to_string()))
    }
}

fn setting<T>(env: &Environment, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr<Err = String>,
{
    let key = format!("{}.{}", KEY_PREFIX, name);
    env.get_string(&key)
        .map(|value| value.parse())
        .transpose()
        .map_err(|message| ConfigError::InvalidValue { key, message })
}
