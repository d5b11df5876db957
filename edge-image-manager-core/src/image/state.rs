//! 镜像与镜像状态

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::Container;

/// 运行时上的一个镜像
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// 运行时分配的镜像ID
    pub image_id: String,
    /// 指向该镜像的名称（repository:tag），不重复
    pub names: Vec<String>,
    /// 镜像大小（字节）
    pub size: i64,
}

impl Image {
    pub fn new(image_id: impl Into<String>, size: i64) -> Self {
        Self {
            image_id: image_id.into(),
            names: Vec::new(),
            size,
        }
    }
}

/// 镜像状态：镜像本身、引用它的容器以及使用时间
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageState {
    pub image: Image,
    /// 引用该镜像的容器，重启后由任务引擎重新注册，不持久化
    #[serde(skip)]
    pub containers: Vec<Container>,
    /// 首次拉取时间
    pub pulled_at: DateTime<Utc>,
    /// 最后一次有容器释放该镜像的时间，只在移除容器引用时更新
    pub last_used_at: DateTime<Utc>,
}

impl ImageState {
    /// 创建镜像状态，最后使用时间初始化为拉取时间
    pub fn new(image: Image, pulled_at: DateTime<Utc>) -> Self {
        Self {
            image,
            containers: Vec::new(),
            pulled_at,
            last_used_at: pulled_at,
        }
    }

    pub fn image_id(&self) -> &str {
        &self.image.image_id
    }

    pub fn names(&self) -> &[String] {
        &self.image.names
    }

    pub fn has_alias(&self, name: &str) -> bool {
        self.image.names.iter().any(|n| n == name)
    }

    /// 添加镜像名称，已存在时不做任何事
    pub fn add_alias(&mut self, name: &str) {
        if !self.has_alias(name) {
            tracing::info!("Adding image name {} to image state {}", name, self.image.image_id);
            self.image.names.push(name.to_string());
        }
    }

    /// 移除所有等于 `name` 的镜像名称，返回是否有移除
    pub fn remove_alias(&mut self, name: &str) -> bool {
        let before = self.image.names.len();
        self.image.names.retain(|n| n != name);
        before != self.image.names.len()
    }

    /// 追加容器引用，不更新最后使用时间
    pub fn add_container_ref(&mut self, container: Container) {
        tracing::info!(
            "Updating container reference {} in image state {}",
            container.name,
            self.image.image_id
        );
        self.containers.push(container);
    }

    /// 移除第一个同名的容器引用，成功时把最后使用时间更新为 `now`
    pub fn remove_container_ref(&mut self, container_name: &str, now: DateTime<Utc>) -> bool {
        match self.containers.iter().position(|c| c.name == container_name) {
            Some(index) => {
                self.containers.remove(index);
                self.last_used_at = now;
                true
            }
            None => false,
        }
    }

    pub fn has_no_containers(&self) -> bool {
        self.containers.is_empty()
    }

    /// 没有名称也没有容器引用，可以从清单中清除
    pub fn is_removable(&self) -> bool {
        self.image.names.is_empty() && self.containers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn state() -> ImageState {
        ImageState::new(Image::new("sha256:abc", 100), Utc::now() - Duration::hours(2))
    }

    #[test]
    fn test_add_alias_is_idempotent() {
        let mut state = state();
        state.add_alias("app:latest");
        state.add_alias("app:latest");
        assert_eq!(state.names(), ["app:latest".to_string()]);
    }

    #[test]
    fn test_remove_alias_keeps_order_of_others() {
        let mut state = state();
        state.add_alias("a:1");
        state.add_alias("b:1");
        state.add_alias("c:1");
        // 手工构造重复项，移除时应全部删掉
        state.image.names.push("b:1".to_string());

        assert!(state.remove_alias("b:1"));
        assert_eq!(state.names(), ["a:1".to_string(), "c:1".to_string()]);
        assert!(!state.remove_alias("b:1"));
    }

    #[test]
    fn test_add_container_does_not_touch_last_used() {
        let mut state = state();
        let last_used = state.last_used_at;

        state.add_container_ref(Container::new("c1", "app:latest"));
        assert_eq!(state.last_used_at, last_used);
        assert!(!state.has_no_containers());
    }

    #[test]
    fn test_remove_container_updates_last_used() {
        let mut state = state();
        state.add_container_ref(Container::new("c1", "app:latest"));
        state.add_container_ref(Container::new("c1", "app:latest"));
        state.add_container_ref(Container::new("c2", "app:latest"));

        let now = Utc::now();
        assert!(state.remove_container_ref("c1", now));
        assert_eq!(state.last_used_at, now);
        // 只移除一个同名引用
        let names: Vec<&str> = state.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["c1", "c2"]);
    }

    #[test]
    fn test_remove_missing_container() {
        let mut state = state();
        let last_used = state.last_used_at;
        assert!(!state.remove_container_ref("ghost", Utc::now()));
        assert_eq!(state.last_used_at, last_used);
    }

    #[test]
    fn test_has_no_containers_and_removable() {
        let mut state = state();
        assert!(state.has_no_containers());
        assert!(state.is_removable());

        state.add_alias("app:latest");
        assert!(state.has_no_containers());
        assert!(!state.is_removable());

        state.add_container_ref(Container::new("c1", "app:latest"));
        assert!(!state.has_no_containers());

        state.remove_container_ref("c1", Utc::now());
        state.remove_alias("app:latest");
        assert!(state.is_removable());
    }
}
