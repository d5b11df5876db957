//! 镜像生命周期管理器
//!
//! 记录每个镜像被哪些容器引用，并周期性地删除最久未使用的闲置镜像。
//!
//! 清单由一把粗粒度的读写锁保护：增删容器引用在整个调用期间（包括运行时查询）持有写锁，
//! 回收周期从筛选候选到删除完成也一直持有写锁。因此一个被选中删除的镜像不可能在删除
//! 过程中被新容器引用，代价是回收期间所有容器的启停都要等待。

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{Image, ImageCleanupPolicy, ImageInventory, ImageState};
use crate::container::{ImageInspection, ImageRuntime};
use crate::core::{Clock, Container, ImageManagerError, NoopSaver, StateSaver, SystemClock};

/// 一次回收周期的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// 满足条件的候选镜像数量
    pub candidates: usize,
    /// 本周期选中删除的镜像数量
    pub selected: usize,
    /// 已从清单中清除的镜像ID
    pub purged: Vec<String>,
    /// 已从运行时解除的镜像名称
    pub untagged: Vec<String>,
    /// 删除失败、留到下个周期的镜像ID
    pub failed: Vec<String>,
}

/// 镜像管理器
pub struct ImageManager {
    /// 镜像清单，唯一的锁
    inventory: RwLock<ImageInventory>,
    runtime: Arc<dyn ImageRuntime>,
    saver: Arc<dyn StateSaver>,
    clock: Arc<dyn Clock>,
    policy: ImageCleanupPolicy,
}

impl ImageManager {
    /// 创建镜像管理器，默认不持久化、使用系统时钟
    pub fn new(runtime: Arc<dyn ImageRuntime>, policy: ImageCleanupPolicy) -> Self {
        Self {
            inventory: RwLock::new(ImageInventory::new()),
            runtime,
            saver: Arc::new(NoopSaver),
            clock: Arc::new(SystemClock),
            policy,
        }
    }

    /// 设置状态保存器
    pub fn with_saver(mut self, saver: Arc<dyn StateSaver>) -> Self {
        self.saver = saver;
        self
    }

    /// 设置时钟
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &ImageCleanupPolicy {
        &self.policy
    }

    /// 容器创建时调用：记录容器对其镜像的引用
    pub async fn add_container_reference(&self, container: &Container) -> Result<(), ImageManagerError> {
        if container.image.is_empty() {
            return Err(ImageManagerError::InvalidReference {
                container: container.name.clone(),
            });
        }

        let mut inventory = self.inventory.write().await;
        let inspection = self.inspect(&container.image).await?;

        // 标签已经指向新的镜像ID，先从旧镜像上摘掉
        inventory.strip_alias_from_others(&container.image, &inspection.id);

        match inventory.get_mut(&inspection.id) {
            Some(state) => {
                state.add_alias(&container.image);
                state.add_container_ref(container.clone());
            }
            None => {
                let mut state = ImageState::new(Image::new(&inspection.id, inspection.size), self.clock.now());
                state.add_alias(&container.image);
                state.add_container_ref(container.clone());
                tracing::info!(
                    "Tracking new image state {} ({} bytes) for {}",
                    inspection.id,
                    inspection.size,
                    container.image
                );
                inventory.add_state(state);
            }
        }

        Ok(())
    }

    /// 容器终止时调用：移除容器对其镜像的引用
    pub async fn remove_container_reference(&self, container: &Container) -> Result<(), ImageManagerError> {
        if container.image.is_empty() {
            return Err(ImageManagerError::InvalidReference {
                container: container.name.clone(),
            });
        }

        let mut inventory = self.inventory.write().await;
        let inspection = self.inspect(&container.image).await?;
        let now = self.clock.now();

        let state = inventory
            .get_mut(&inspection.id)
            .ok_or_else(|| ImageManagerError::NotFound {
                image_id: inspection.id.clone(),
            })?;

        if !state.remove_container_ref(&container.name, now) {
            return Err(ImageManagerError::ReferenceNotFound {
                container: container.name.clone(),
                image_id: inspection.id,
            });
        }

        tracing::info!(
            "Removed container reference {} from image state {}",
            container.name,
            inspection.id
        );
        Ok(())
    }

    /// 启动时恢复持久化的镜像状态，已登记的镜像ID会被跳过
    pub async fn add_all_image_states(&self, states: Vec<ImageState>) -> usize {
        let mut inventory = self.inventory.write().await;
        let mut added = 0;

        for state in states {
            if inventory.contains(state.image_id()) {
                tracing::warn!("Image state {} already tracked, skipping restore", state.image_id());
                continue;
            }
            inventory.add_state(state);
            added += 1;
        }

        tracing::info!("Restored {} image states", added);
        added
    }

    /// 按镜像名称获取镜像状态的快照
    pub async fn image_state_by_name(&self, name: &str) -> Option<ImageState> {
        self.inventory.read().await.get_by_alias(name).cloned()
    }

    /// 按镜像ID获取镜像状态的快照
    pub async fn image_state(&self, image_id: &str) -> Option<ImageState> {
        self.inventory.read().await.get(image_id).cloned()
    }

    /// 全部镜像状态的快照
    pub async fn image_states(&self) -> Vec<ImageState> {
        self.inventory.read().await.snapshot()
    }

    /// 持久化当前清单
    pub async fn save_state(&self) -> Result<(), crate::core::PersistenceError> {
        let snapshot = self.inventory.read().await.snapshot();
        self.saver.save(&snapshot).await
    }

    /// 在后台启动周期性回收，`token` 取消后任务退出
    pub fn start_image_cleanup_process(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_image_cleanup(token).await })
    }

    /// 周期性回收循环。第一次回收发生在启动一个周期之后；正在进行的回收不会被取消打断
    pub async fn run_image_cleanup(&self, token: CancellationToken) {
        let period = self.policy.interval;
        tracing::info!("Starting image cleanup process with interval: {:?}", period);

        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Image cleanup process stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let report = self.remove_unused_images().await;
                    tracing::info!(
                        candidates = report.candidates,
                        selected = report.selected,
                        purged = report.purged.len(),
                        failed = report.failed.len(),
                        "Image cleanup cycle completed"
                    );
                }
            }
        }
    }

    /// 执行一次回收：筛选候选、按LRU选出若干镜像并删除
    pub async fn remove_unused_images(&self) -> CleanupReport {
        let mut inventory = self.inventory.write().await;
        let now = self.clock.now();

        let candidates = self.policy.candidates(inventory.all(), now);
        let mut report = CleanupReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            tracing::info!("No eligible images for deletion for this cleanup cycle");
            return report;
        }

        for candidate in &candidates {
            tracing::debug!(
                "Candidate image for deletion: {} {:?} last used at {}",
                candidate.image_id(),
                candidate.names(),
                candidate.last_used_at
            );
        }

        let selected: Vec<(String, Vec<String>)> = self
            .policy
            .select_least_recently_used(candidates)
            .into_iter()
            .map(|state| (state.image.image_id.clone(), state.image.names.clone()))
            .collect();
        report.selected = selected.len();

        for (image_id, names) in selected {
            self.remove_image(&mut inventory, &image_id, names, &mut report).await;
        }

        report
    }

    /// 删除一个镜像：没有名称时按ID删除，否则逐个解除名称。
    /// 任何一次删除失败都停止处理该镜像，剩余名称留到下个周期
    async fn remove_image(
        &self,
        inventory: &mut ImageInventory,
        image_id: &str,
        names: Vec<String>,
        report: &mut CleanupReport,
    ) {
        if names.is_empty() {
            // 可能是 <none>:<none> 的无标签镜像
            if let Err(e) = self.delete_from_runtime(image_id).await {
                tracing::error!(error_kind = e.kind(), "{}", e);
                report.failed.push(image_id.to_string());
                return;
            }
        } else {
            for name in names {
                if let Err(e) = self.delete_from_runtime(&name).await {
                    tracing::error!(error_kind = e.kind(), "{}", e);
                    report.failed.push(image_id.to_string());
                    return;
                }
                if let Some(state) = inventory.get_mut(image_id) {
                    state.remove_alias(&name);
                }
                report.untagged.push(name);
            }
        }

        let removable = inventory.get(image_id).is_some_and(ImageState::is_removable);
        if removable {
            inventory.remove_state(image_id);
            tracing::info!("Removed image state {} from image manager", image_id);
            report.purged.push(image_id.to_string());

            if let Err(e) = self.saver.save(&inventory.snapshot()).await {
                tracing::error!("Failed to save image states after removing {}: {}", image_id, e);
            }
        }
    }

    /// 调用运行时删除镜像，"镜像不存在"视为成功
    async fn delete_from_runtime(&self, identity: &str) -> Result<(), ImageManagerError> {
        match self.runtime.remove_image(identity, self.policy.remove_timeout).await {
            Ok(()) => {
                tracing::info!("Image removed: {}", identity);
                Ok(())
            }
            Err(e) if e.is_no_such_image() => {
                tracing::warn!("Image {} already removed from the instance", identity);
                Ok(())
            }
            Err(source) => Err(ImageManagerError::Deletion {
                identity: identity.to_string(),
                source,
            }),
        }
    }

    async fn inspect(&self, reference: &str) -> Result<ImageInspection, ImageManagerError> {
        self.runtime.inspect_image(reference).await.map_err(|source| {
            tracing::error!("Error inspecting image {}: {}", reference, source);
            ImageManagerError::Inspection {
                image: reference.to_string(),
                source,
            }
        })
    }
}
