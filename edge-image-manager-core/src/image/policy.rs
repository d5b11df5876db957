//! 镜像回收策略：候选筛选与LRU排序

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::ImageState;

/// 默认每个周期最多删除的镜像数量
pub const DEFAULT_IMAGES_PER_CYCLE: usize = 5;
/// 默认的最小镜像年龄
pub const DEFAULT_MINIMUM_AGE: Duration = Duration::from_secs(60 * 60);
/// 默认回收周期
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3 * 60 * 60);
/// 默认单次删除超时
pub const DEFAULT_REMOVE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// 镜像回收策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCleanupPolicy {
    /// 回收周期
    pub interval: Duration,
    /// 拉取后至少经过多久才能被删除
    pub minimum_age: Duration,
    /// 每个周期最多删除的镜像数量
    pub images_per_cycle: usize,
    /// 单次删除调用的超时时间
    pub remove_timeout: Duration,
}

impl Default for ImageCleanupPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CLEANUP_INTERVAL,
            minimum_age: DEFAULT_MINIMUM_AGE,
            images_per_cycle: DEFAULT_IMAGES_PER_CYCLE,
            remove_timeout: DEFAULT_REMOVE_TIMEOUT,
        }
    }
}

impl ImageCleanupPolicy {
    /// 镜像是否足够老
    pub fn is_old_enough(&self, state: &ImageState, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.minimum_age) {
            Ok(minimum_age) => now.signed_duration_since(state.pulled_at) > minimum_age,
            // 超出chrono范围的年龄阈值永远达不到
            Err(_) => false,
        }
    }

    /// 候选条件：足够老并且没有容器引用。最后使用时间只影响排序
    pub fn is_eligible(&self, state: &ImageState, now: DateTime<Utc>) -> bool {
        self.is_old_enough(state, now) && state.has_no_containers()
    }

    /// 筛选出所有候选镜像
    pub fn candidates<'a, I>(&self, states: I, now: DateTime<Utc>) -> Vec<&'a ImageState>
    where
        I: IntoIterator<Item = &'a ImageState>,
    {
        states
            .into_iter()
            .filter(|state| self.is_eligible(state, now))
            .collect()
    }

    /// 按最后使用时间升序排列，取最久未使用的若干个
    pub fn select_least_recently_used<'a>(&self, mut candidates: Vec<&'a ImageState>) -> Vec<&'a ImageState> {
        candidates.sort_by_key(|state| state.last_used_at);
        candidates.truncate(self.images_per_cycle);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Container;
    use crate::image::Image;
    use chrono::Duration as ChronoDuration;

    fn state(id: &str, pulled_ago: ChronoDuration, last_used_ago: ChronoDuration, now: DateTime<Utc>) -> ImageState {
        let mut state = ImageState::new(Image::new(id, 1), now - pulled_ago);
        state.last_used_at = now - last_used_ago;
        state
    }

    #[test]
    fn test_default_policy() {
        let policy = ImageCleanupPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(10800));
        assert_eq!(policy.minimum_age, Duration::from_secs(3600));
        assert_eq!(policy.images_per_cycle, 5);
    }

    #[test]
    fn test_eligible_when_old_and_unreferenced() {
        let now = Utc::now();
        let policy = ImageCleanupPolicy::default();
        let mut image = state("sha256:a", ChronoDuration::hours(2), ChronoDuration::hours(1), now);
        assert!(policy.is_eligible(&image, now));

        image.add_container_ref(Container::new("c1", "a:latest"));
        assert!(!policy.is_eligible(&image, now));
    }

    #[test]
    fn test_just_pulled_is_not_eligible() {
        let now = Utc::now();
        let policy = ImageCleanupPolicy::default();
        let image = state("sha256:a", ChronoDuration::minutes(30), ChronoDuration::hours(5), now);
        assert!(!policy.is_eligible(&image, now));

        // 恰好等于阈值也不算
        let image = state("sha256:b", ChronoDuration::hours(1), ChronoDuration::hours(1), now);
        assert!(!policy.is_eligible(&image, now));
    }

    #[test]
    fn test_select_five_least_recently_used() {
        let now = Utc::now();
        let policy = ImageCleanupPolicy::default();
        let states: Vec<ImageState> = (1..=6)
            .map(|i| {
                state(
                    &format!("sha256:{}", i),
                    ChronoDuration::hours(10),
                    ChronoDuration::minutes(i * 10),
                    now,
                )
            })
            .collect();

        let candidates = policy.candidates(states.iter(), now);
        assert_eq!(candidates.len(), 6);

        let selected = policy.select_least_recently_used(candidates);
        let ids: Vec<&str> = selected.iter().map(|s| s.image_id()).collect();
        assert_eq!(ids, ["sha256:6", "sha256:5", "sha256:4", "sha256:3", "sha256:2"]);
    }

    #[test]
    fn test_select_all_when_fewer_than_limit() {
        let now = Utc::now();
        let policy = ImageCleanupPolicy::default();
        let states: Vec<ImageState> = (1..=3)
            .map(|i| {
                state(
                    &format!("sha256:{}", i),
                    ChronoDuration::hours(10),
                    ChronoDuration::minutes(i * 10),
                    now,
                )
            })
            .collect();

        let selected = policy.select_least_recently_used(policy.candidates(states.iter(), now));
        let ids: Vec<&str> = selected.iter().map(|s| s.image_id()).collect();
        assert_eq!(ids, ["sha256:3", "sha256:2", "sha256:1"]);
    }
}
