//! 错误处理定义

use thiserror::Error;

use crate::container::RuntimeError;

/// 镜像管理器错误类型
#[derive(Error, Debug)]
pub enum ImageManagerError {
    /// 容器未携带镜像名称，属于调用方错误
    #[error("Invalid container reference: empty image name (container: {container})")]
    InvalidReference { container: String },

    /// 容器运行时无法解析镜像引用
    #[error("Error inspecting image {image}: {source}")]
    Inspection {
        image: String,
        #[source]
        source: RuntimeError,
    },

    /// 镜像ID没有对应的镜像状态
    #[error("Cannot find image state for image {image_id}")]
    NotFound { image_id: String },

    /// 镜像状态中不存在该容器的引用
    #[error("Container reference {container} is not found in image state {image_id}")]
    ReferenceNotFound { container: String, image_id: String },

    /// 删除镜像失败（仅在回收循环内部使用）
    #[error("Error removing image {identity}: {source}")]
    Deletion {
        identity: String,
        #[source]
        source: RuntimeError,
    },
}

impl ImageManagerError {
    /// 错误类型名称，用于日志字段
    pub fn kind(&self) -> &'static str {
        match self {
            ImageManagerError::InvalidReference { .. } => "invalid_reference",
            ImageManagerError::Inspection { .. } => "inspection",
            ImageManagerError::NotFound { .. } => "not_found",
            ImageManagerError::ReferenceNotFound { .. } => "reference_not_found",
            ImageManagerError::Deletion { .. } => "deletion",
        }
    }
}

/// 持久化错误
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// 数据库错误
    #[error("Database error during {operation}: {message}")]
    Database { message: String, operation: String },

    /// 序列化错误
    #[error("Serialization error for {data_type}: {message}")]
    Serialization { message: String, data_type: String },
}

impl From<sled::Error> for PersistenceError {
    fn from(e: sled::Error) -> Self {
        PersistenceError::Database {
            message: e.to_string(),
            operation: "sled".to_string(),
        }
    }
}
