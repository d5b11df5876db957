//! 镜像清单

use std::collections::HashMap;

use super::ImageState;

/// 镜像ID到镜像状态的映射
///
/// 只是数据容器：并发保护和"同一ID只登记一次"的检查都由 [`super::ImageManager`] 负责
#[derive(Debug, Default, Clone)]
pub struct ImageInventory {
    states: HashMap<String, ImageState>,
}

impl ImageInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记镜像状态，返回被替换掉的旧状态
    pub fn add_state(&mut self, state: ImageState) -> Option<ImageState> {
        self.states.insert(state.image.image_id.clone(), state)
    }

    /// 按镜像ID移除镜像状态
    pub fn remove_state(&mut self, image_id: &str) -> Option<ImageState> {
        self.states.remove(image_id)
    }

    pub fn get(&self, image_id: &str) -> Option<&ImageState> {
        self.states.get(image_id)
    }

    pub fn get_mut(&mut self, image_id: &str) -> Option<&mut ImageState> {
        self.states.get_mut(image_id)
    }

    pub fn contains(&self, image_id: &str) -> bool {
        self.states.contains_key(image_id)
    }

    /// 按镜像名称查找
    pub fn get_by_alias(&self, name: &str) -> Option<&ImageState> {
        self.states.values().find(|state| state.has_alias(name))
    }

    pub fn all(&self) -> impl Iterator<Item = &ImageState> {
        self.states.values()
    }

    /// 克隆出全部镜像状态
    pub fn snapshot(&self) -> Vec<ImageState> {
        self.states.values().cloned().collect()
    }

    /// 从ID不是 `keep_id` 的镜像上摘掉名称 `name`，返回被修改的镜像ID
    ///
    /// 标签被重新指向新镜像后，旧镜像不能继续持有同一个名称
    pub fn strip_alias_from_others(&mut self, name: &str, keep_id: &str) -> Vec<String> {
        let mut touched = Vec::new();
        for (id, state) in self.states.iter_mut() {
            if id != keep_id && state.remove_alias(name) {
                tracing::info!("Untagged image name {} from image state {}", name, id);
                touched.push(id.clone());
            }
        }
        touched
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
