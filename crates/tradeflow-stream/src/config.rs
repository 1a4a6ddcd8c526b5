//! 流式客户端配置
//!
//! 优先级（低到高）：内置默认值 → YAML 配置文件 → 环境变量 → 调用方覆盖

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::reassembler::ErrorMode;

/// 环境变量：API 基础地址
pub const ENV_BASE_URL: &str = "TRADEFLOW_API_BASE_URL";
/// 环境变量：连接超时（毫秒）
pub const ENV_CONNECTION_TIMEOUT: &str = "TRADEFLOW_STREAM_TIMEOUT_MS";
/// 环境变量：心跳间隔（毫秒）
pub const ENV_HEARTBEAT_INTERVAL: &str = "TRADEFLOW_HEARTBEAT_INTERVAL_MS";
/// 环境变量：重连间隔（毫秒）
pub const ENV_RECONNECT_INTERVAL: &str = "TRADEFLOW_RECONNECT_INTERVAL_MS";
/// 环境变量：最大重连次数
pub const ENV_MAX_RECONNECT_ATTEMPTS: &str = "TRADEFLOW_MAX_RECONNECT_ATTEMPTS";
/// 环境变量：是否自动重连
pub const ENV_AUTO_RECONNECT: &str = "TRADEFLOW_AUTO_RECONNECT";

/// 退避方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// 固定间隔
    #[default]
    Fixed,
    /// 指数退避，上限为 `max_interval_ms`
    Exponential,
}

/// 重连配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// 是否自动重连
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    /// 最大重连次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 重连间隔（毫秒）
    #[serde(default = "default_reconnect_interval")]
    pub interval_ms: u64,
    /// 退避方式
    #[serde(default)]
    pub backoff: Backoff,
    /// 最大重连间隔（毫秒）
    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,
}

fn default_auto_reconnect() -> bool {
    true
}
fn default_max_attempts() -> u32 {
    5
}
fn default_reconnect_interval() -> u64 {
    3000
}
fn default_max_interval() -> u64 {
    30000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            max_attempts: default_max_attempts(),
            interval_ms: default_reconnect_interval(),
            backoff: Backoff::default(),
            max_interval_ms: default_max_interval(),
        }
    }
}

impl ReconnectConfig {
    /// 第 `attempt` 次重连（从 1 开始）前的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay_ms = match self.backoff {
            Backoff::Fixed => self.interval_ms,
            Backoff::Exponential => {
                let exponent = attempt.saturating_sub(1).min(16);
                self.interval_ms
                    .saturating_mul(1u64 << exponent)
                    .min(self.max_interval_ms.max(self.interval_ms))
            }
        };
        Duration::from_millis(delay_ms)
    }

    /// 所有重连等待时间之和的上限
    pub fn max_total_retry_time(&self) -> Duration {
        (1..=self.max_attempts).map(|attempt| self.delay_for(attempt)).sum()
    }
}

/// 流式客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// API 基础地址
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 流式接口路径
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// 连接超时（毫秒）
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_ms: u64,
    /// 心跳检测间隔（毫秒），0 表示关闭
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// 诊断事件历史长度
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// 收到 error 事件时是否把进行中的助手消息标记为失败
    #[serde(default)]
    pub mark_in_flight_on_error: bool,
    /// 重连配置
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}
fn default_stream_path() -> String {
    "chat/stream".to_string()
}
fn default_connection_timeout() -> u64 {
    60000
}
fn default_heartbeat_interval() -> u64 {
    30000
}
fn default_history_limit() -> usize {
    100
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_path: default_stream_path(),
            connection_timeout_ms: default_connection_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            history_limit: default_history_limit(),
            mark_in_flight_on_error: false,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl StreamConfig {
    /// 加载配置：`path` 为 None 时读取默认路径，文件不存在则使用默认值
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 YAML 文件读取
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 应用环境变量覆盖
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = env_value(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(ms) = env_parse(ENV_CONNECTION_TIMEOUT)? {
            self.connection_timeout_ms = ms;
        }
        if let Some(ms) = env_parse(ENV_HEARTBEAT_INTERVAL)? {
            self.heartbeat_interval_ms = ms;
        }
        if let Some(ms) = env_parse(ENV_RECONNECT_INTERVAL)? {
            self.reconnect.interval_ms = ms;
        }
        if let Some(attempts) = env_parse(ENV_MAX_RECONNECT_ATTEMPTS)? {
            self.reconnect.max_attempts = attempts;
        }
        if let Some(value) = env_value(ENV_AUTO_RECONNECT) {
            self.reconnect.auto_reconnect = match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::invalid(
                        ENV_AUTO_RECONNECT,
                        format!("expected a boolean, got '{}'", value),
                    ))
                }
            };
        }
        Ok(())
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("base_url", "must not be empty"));
        }
        if self.connection_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "connection_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.reconnect.interval_ms == 0 {
            return Err(ConfigError::invalid(
                "reconnect.interval_ms",
                "must be greater than zero",
            ));
        }
        if self.reconnect.max_interval_ms < self.reconnect.interval_ms {
            return Err(ConfigError::invalid(
                "reconnect.max_interval_ms",
                "must not be smaller than reconnect.interval_ms",
            ));
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// 心跳间隔，关闭时为 None
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn error_mode(&self) -> ErrorMode {
        if self.mark_in_flight_on_error {
            ErrorMode::MarkInFlight
        } else {
            ErrorMode::Surface
        }
    }
}

/// 默认配置文件路径 (~/.tradeflow/stream.yaml)
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tradeflow")
        .join("stream.yaml")
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env_value(key) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            ConfigError::invalid(key, format!("expected a number, got '{}'", raw))
        }),
        None => Ok(None),
    }
}
