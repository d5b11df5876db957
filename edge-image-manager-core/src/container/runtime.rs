//! 镜像运行时接口

use async_trait::async_trait;
use std::time::Duration;

/// 运行时对镜像引用的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInspection {
    /// 内容派生的镜像ID
    pub id: String,
    /// 镜像大小（字节）
    pub size: i64,
}

/// 镜像运行时操作：查询、删除
#[async_trait]
pub trait ImageRuntime: Send + Sync {
    /// 把镜像引用（name:tag 或 digest）解析为镜像ID和大小
    async fn inspect_image(&self, reference: &str) -> Result<ImageInspection, RuntimeError>;

    /// 删除镜像。`identity` 为镜像名称时只解除该标签，为镜像ID时删除镜像本身
    async fn remove_image(&self, identity: &str, timeout: Duration) -> Result<(), RuntimeError>;
}

/// 运行时错误
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// 运行时上不存在该镜像，删除时视为已删除
    #[error("no such image: {0}")]
    NoSuchImage(String),

    #[error("{operation} timed out after {duration_seconds}s")]
    Timeout {
        operation: String,
        duration_seconds: u64,
    },

    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("failed to parse runtime output: {message}")]
    Parse { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn is_no_such_image(&self) -> bool {
        matches!(self, RuntimeError::NoSuchImage(_))
    }
}
