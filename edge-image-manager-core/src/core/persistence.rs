//! 数据持久化模块
//!
//! 镜像清单的持久化存储。镜像状态中的容器引用不会被写入，
//! 重启后由任务引擎重新注册

use async_trait::async_trait;
use sled::Db;
use std::path::Path;
use std::sync::Arc;

use super::PersistenceError;
use crate::image::ImageState;

/// 存储键常量
const IMAGE_PREFIX: &str = "image:";

/// 状态保存器：每次清除镜像状态后调用
#[async_trait]
pub trait StateSaver: Send + Sync {
    /// 保存当前的镜像清单
    async fn save(&self, images: &[ImageState]) -> Result<(), PersistenceError>;
}

/// 不做任何事情的保存器
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSaver;

#[async_trait]
impl StateSaver for NoopSaver {
    async fn save(&self, _images: &[ImageState]) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// 持久化存储
pub struct PersistenceStore {
    /// Sled数据库实例
    db: Arc<Db>,
}

impl PersistenceStore {
    /// 打开（或创建）指定目录下的数据库
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let db = sled::open(path).map_err(|e| PersistenceError::Database {
            message: e.to_string(),
            operation: "open".to_string(),
        })?;

        Ok(Self { db: Arc::new(db) })
    }

    /// 创建临时数据库，数据在drop后丢弃
    pub fn temporary() -> Result<Self, PersistenceError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| PersistenceError::Database {
                message: e.to_string(),
                operation: "open".to_string(),
            })?;

        Ok(Self { db: Arc::new(db) })
    }

    /// 用给定的快照替换全部镜像状态
    pub async fn store_image_states(&self, images: &[ImageState]) -> Result<(), PersistenceError> {
        let mut batch = sled::Batch::default();

        for item in self.db.scan_prefix(IMAGE_PREFIX.as_bytes()) {
            let (key, _) = item?;
            batch.remove(key);
        }

        for state in images {
            let key = format!("{}{}", IMAGE_PREFIX, state.image.image_id);
            let value = bincode::serialize(state).map_err(|e| PersistenceError::Serialization {
                message: e.to_string(),
                data_type: "ImageState".to_string(),
            })?;
            batch.insert(key.as_bytes(), value);
        }

        self.db.apply_batch(batch).map_err(|e| PersistenceError::Database {
            message: e.to_string(),
            operation: "apply_batch".to_string(),
        })?;

        // 确保数据写入磁盘
        self.db.flush_async().await.map_err(|e| PersistenceError::Database {
            message: e.to_string(),
            operation: "flush".to_string(),
        })?;

        tracing::debug!("Stored {} image states", images.len());
        Ok(())
    }

    /// 加载全部镜像状态
    pub async fn load_image_states(&self) -> Result<Vec<ImageState>, PersistenceError> {
        let mut states = Vec::new();

        for item in self.db.scan_prefix(IMAGE_PREFIX.as_bytes()) {
            let (_, value) = item?;
            let state: ImageState =
                bincode::deserialize(&value).map_err(|e| PersistenceError::Serialization {
                    message: e.to_string(),
                    data_type: "ImageState".to_string(),
                })?;
            states.push(state);
        }

        Ok(states)
    }

    /// 已存储的镜像数量
    pub fn image_count(&self) -> usize {
        self.db.scan_prefix(IMAGE_PREFIX.as_bytes()).count()
    }
}

#[async_trait]
impl StateSaver for PersistenceStore {
    async fn save(&self, images: &[ImageState]) -> Result<(), PersistenceError> {
        self.store_image_states(images).await
    }
}
