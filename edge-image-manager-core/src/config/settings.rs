//! 配置结构体定义

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::image::ImageCleanupPolicy;

/// 回收周期的下限（秒），过于频繁的回收会长时间占用镜像清单的写锁
pub const MINIMUM_CLEANUP_INTERVAL_SECONDS: u64 = 10 * 60;

/// 应用程序配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 镜像回收配置
    pub image_cleanup: ImageCleanupSettings,
    /// 容器运行时配置
    pub runtime: RuntimeSettings,
    /// 持久化配置
    pub persistence: PersistenceSettings,
    /// 日志配置
    pub logging: LoggingSettings,
}

/// 镜像回收配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCleanupSettings {
    /// 是否启用周期性回收
    pub enabled: bool,
    /// 回收周期（秒）
    pub interval_seconds: u64,
    /// 镜像拉取后至少经过多久才允许删除（秒）
    pub minimum_age_seconds: u64,
    /// 每个周期最多删除的镜像数量
    pub images_per_cycle: usize,
    /// 单次删除调用的超时时间（秒）
    pub remove_timeout_seconds: u64,
}

/// 容器运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Docker兼容的命令行工具（docker / nerdctl / podman）
    pub binary: PathBuf,
    /// 镜像查询超时时间（秒）
    pub inspect_timeout_seconds: u64,
}

/// 持久化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// 是否持久化镜像清单
    pub enabled: bool,
    /// 数据目录
    pub data_dir: PathBuf,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 日志级别（EnvFilter 语法）
    pub level: String,
    /// 日志输出格式
    pub format: LogFormat,
    /// 日志文件路径，按天轮转
    pub file_path: Option<PathBuf>,
    /// 是否输出到控制台
    pub console_output: bool,
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON格式
    Json,
    /// 文本格式
    Text,
}

impl Settings {
    /// 把越界的配置值修正到允许的范围内
    pub fn normalize(mut self) -> Self {
        let cleanup = &mut self.image_cleanup;

        if cleanup.interval_seconds < MINIMUM_CLEANUP_INTERVAL_SECONDS {
            tracing::warn!(
                "Image cleanup interval too short ({}s), using minimum {}s",
                cleanup.interval_seconds,
                MINIMUM_CLEANUP_INTERVAL_SECONDS
            );
            cleanup.interval_seconds = MINIMUM_CLEANUP_INTERVAL_SECONDS;
        }

        if cleanup.images_per_cycle == 0 {
            tracing::warn!("Images per cleanup cycle must be at least 1, using 1");
            cleanup.images_per_cycle = 1;
        }

        if cleanup.remove_timeout_seconds == 0 {
            tracing::warn!("Image remove timeout must be at least 1s, using 1s");
            cleanup.remove_timeout_seconds = 1;
        }

        if self.runtime.inspect_timeout_seconds == 0 {
            tracing::warn!("Image inspect timeout must be at least 1s, using 1s");
            self.runtime.inspect_timeout_seconds = 1;
        }

        self
    }
}

impl ImageCleanupSettings {
    /// 转换为镜像管理器使用的回收策略
    pub fn policy(&self) -> ImageCleanupPolicy {
        ImageCleanupPolicy {
            interval: Duration::from_secs(self.interval_seconds),
            minimum_age: Duration::from_secs(self.minimum_age_seconds),
            images_per_cycle: self.images_per_cycle,
            remove_timeout: Duration::from_secs(self.remove_timeout_seconds),
        }
    }
}

impl RuntimeSettings {
    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_secs(self.inspect_timeout_seconds)
    }
}

impl Default for ImageCleanupSettings {
    fn default() -> Self {
        let policy = ImageCleanupPolicy::default();
        Self {
            enabled: true,
            interval_seconds: policy.interval.as_secs(),
            minimum_age_seconds: policy.minimum_age.as_secs(),
            images_per_cycle: policy.images_per_cycle,
            remove_timeout_seconds: policy.remove_timeout.as_secs(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("docker"),
            inspect_timeout_seconds: 30,
        }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("./data/images"),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file_path: None,
            console_output: true,
        }
    }
}
