//! 集成测试共用的运行时和保存器

#![allow(dead_code)]

use async_trait::async_trait;
use edge_image_manager_core::container::{ImageInspection, ImageRuntime, RuntimeError};
use edge_image_manager_core::image::ImageState;
use edge_image_manager_core::{PersistenceError, StateSaver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// 内存中的运行时：名称 -> 镜像
#[derive(Default)]
pub struct FakeRuntime {
    tags: Mutex<HashMap<String, ImageInspection>>,
    removed: Mutex<Vec<String>>,
    inspect_delay: Option<Duration>,
    remove_delay: Option<Duration>,
    removing: AtomicBool,
}

impl FakeRuntime {
    pub fn with_inspect_delay(delay: Duration) -> Self {
        Self {
            inspect_delay: Some(delay),
            ..Default::default()
        }
    }

    /// 每次删除前先等待 `delay`，期间 [`FakeRuntime::is_removing`] 为 true
    pub fn with_remove_delay(delay: Duration) -> Self {
        Self {
            remove_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn is_removing(&self) -> bool {
        self.removing.load(Ordering::SeqCst)
    }

    /// 模拟拉取镜像
    pub fn pull(&self, reference: &str, id: &str, size: i64) {
        self.tags.lock().unwrap().insert(
            reference.to_string(),
            ImageInspection {
                id: id.to_string(),
                size,
            },
        );
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn has_tag(&self, reference: &str) -> bool {
        self.tags.lock().unwrap().contains_key(reference)
    }
}

#[async_trait]
impl ImageRuntime for FakeRuntime {
    async fn inspect_image(&self, reference: &str) -> Result<ImageInspection, RuntimeError> {
        if let Some(delay) = self.inspect_delay {
            tokio::time::sleep(delay).await;
        }
        self.tags
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| RuntimeError::NoSuchImage(reference.to_string()))
    }

    async fn remove_image(&self, identity: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        if let Some(delay) = self.remove_delay {
            self.removing.store(true, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
        }
        let result = self.untag(identity);
        self.removing.store(false, Ordering::SeqCst);
        result
    }
}

impl FakeRuntime {
    fn untag(&self, identity: &str) -> Result<(), RuntimeError> {
        let mut tags = self.tags.lock().unwrap();
        let by_name = tags.remove(identity).is_some();
        let by_id = {
            let before = tags.len();
            tags.retain(|_, image| image.id != identity);
            before != tags.len()
        };
        if !by_name && !by_id {
            return Err(RuntimeError::NoSuchImage(identity.to_string()));
        }
        self.removed.lock().unwrap().push(identity.to_string());
        Ok(())
    }
}

/// 记录每次保存的快照
#[derive(Default)]
pub struct RecordingSaver {
    saves: Mutex<Vec<Vec<String>>>,
}

impl RecordingSaver {
    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    /// 每次保存时清单中的镜像ID（已排序）
    pub fn saved_ids(&self) -> Vec<Vec<String>> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateSaver for RecordingSaver {
    async fn save(&self, images: &[ImageState]) -> Result<(), PersistenceError> {
        let mut ids: Vec<String> = images.iter().map(|s| s.image.image_id.clone()).collect();
        ids.sort();
        self.saves.lock().unwrap().push(ids);
        Ok(())
    }
}
