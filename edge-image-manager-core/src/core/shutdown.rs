//! 优雅关机模块
//!
//! 提供信号处理、后台任务取消和关机前状态保存的机制

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

/// 关机信号类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// 正常关机
    Graceful,
    /// 等待组件超时
    Timeout,
}

/// 关机配置
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// 等待组件退出的超时时间（秒）
    pub graceful_timeout_seconds: u64,
    /// 关机前保存状态
    pub save_state_on_shutdown: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout_seconds: 30,
            save_state_on_shutdown: true,
        }
    }
}

/// 关机管理器
pub struct ShutdownManager {
    /// 广播发送器，用于通知所有组件关机
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    /// 取消令牌，镜像回收循环等后台任务监听它
    cancellation_token: CancellationToken,
    /// 组件名称 -> 是否仍在运行
    active_components: Arc<Mutex<HashMap<String, bool>>>,
    config: ShutdownConfig,
    shutting_down: Arc<Mutex<bool>>,
}

impl ShutdownManager {
    /// 创建新的关机管理器
    pub fn new(config: ShutdownConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx,
            cancellation_token: CancellationToken::new(),
            active_components: Arc::new(Mutex::new(HashMap::new())),
            config,
            shutting_down: Arc::new(Mutex::new(false)),
        }
    }

    /// 注册组件
    pub async fn register_component(&self, component_name: &str) {
        let mut components = self.active_components.lock().await;
        components.insert(component_name.to_string(), true);
        tracing::info!("Component '{}' registered for shutdown management", component_name);
    }

    /// 组件完成关机
    pub async fn component_shutdown_complete(&self, component_name: &str) {
        let mut components = self.active_components.lock().await;
        if let Some(active) = components.get_mut(component_name) {
            *active = false;
        }
        tracing::info!("Component '{}' shutdown completed", component_name);
    }

    /// 获取关机接收器
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// 获取取消令牌
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// 检查是否正在关机
    pub async fn is_shutting_down(&self) -> bool {
        *self.shutting_down.lock().await
    }

    /// 仍在运行的组件
    pub async fn active_components(&self) -> Vec<String> {
        let components = self.active_components.lock().await;
        let mut active: Vec<String> = components
            .iter()
            .filter(|(_, &active)| active)
            .map(|(name, _)| name.clone())
            .collect();
        active.sort();
        active
    }

    /// 等待所有组件完成关机
    async fn wait_for_components(&self) {
        loop {
            if self.active_components().await.is_empty() {
                tracing::info!("All components have shutdown gracefully");
                return;
            }
            // 每100ms检查一次
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// 发起优雅关机
    pub async fn initiate_graceful_shutdown(&self) -> Result<(), ShutdownError> {
        {
            let mut shutting_down = self.shutting_down.lock().await;
            if *shutting_down {
                return Ok(());
            }
            *shutting_down = true;
        }

        tracing::info!("Initiating graceful shutdown...");

        // 没有订阅者时发送会失败，不影响关机流程
        if self.shutdown_tx.send(ShutdownSignal::Graceful).is_err() {
            tracing::debug!("No subscribers for graceful shutdown signal");
        }

        self.cancellation_token.cancel();

        let timeout_seconds = self.config.graceful_timeout_seconds;
        match timeout(Duration::from_secs(timeout_seconds), self.wait_for_components()).await {
            Ok(()) => {
                tracing::info!("Graceful shutdown completed successfully");
                Ok(())
            }
            Err(_) => {
                let active_components = self.active_components().await;
                tracing::warn!("Shutdown timeout reached. Active components: {:?}", active_components);
                let _ = self.shutdown_tx.send(ShutdownSignal::Timeout);
                Err(ShutdownError::Timeout {
                    active_components,
                    timeout_seconds,
                })
            }
        }
    }

    /// 关机配置
    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new(ShutdownConfig::default())
    }
}

/// 关机错误
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("Shutdown timeout: active components {active_components:?}, timeout {timeout_seconds}s")]
    Timeout {
        active_components: Vec<String>,
        timeout_seconds: u64,
    },

    #[error("Shutdown hook failed: {message}")]
    HookFailed { message: String },
}

/// 关机钩子特质
#[async_trait::async_trait]
pub trait ShutdownHook: Send + Sync {
    /// 执行关机前的清理工作
    async fn on_shutdown(&self, signal: ShutdownSignal) -> Result<(), ShutdownError>;
}

/// 关机钩子注册器
pub struct ShutdownHooks {
    hooks: Mutex<Vec<Box<dyn ShutdownHook>>>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// 注册关机钩子
    pub async fn register_hook(&self, hook: Box<dyn ShutdownHook>) {
        let mut hooks = self.hooks.lock().await;
        hooks.push(hook);
        tracing::info!("Shutdown hook registered, total hooks: {}", hooks.len());
    }

    /// 执行所有关机钩子，返回失败的数量
    pub async fn execute_hooks(&self, signal: ShutdownSignal) -> usize {
        let hooks = self.hooks.lock().await;
        tracing::info!("Executing {} shutdown hooks", hooks.len());

        let mut failed = 0;
        for (i, hook) in hooks.iter().enumerate() {
            // 单个钩子失败不影响其他钩子
            if let Err(e) = hook.on_shutdown(signal.clone()).await {
                tracing::error!("Shutdown hook {} failed: {}", i, e);
                failed += 1;
            }
        }
        failed
    }
}

impl Default for ShutdownHooks {
    fn default() -> Self {
        Self::new()
    }
}

/// 信号处理器
pub struct SignalHandler {
    shutdown_manager: Arc<ShutdownManager>,
}

impl SignalHandler {
    pub fn new(shutdown_manager: Arc<ShutdownManager>) -> Self {
        Self { shutdown_manager }
    }

    /// 启动信号监听
    pub async fn start_listening(&self) -> crate::Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            for (kind, name) in [
                (SignalKind::terminate(), "SIGTERM"),
                (SignalKind::interrupt(), "SIGINT"),
            ] {
                let mut stream = signal(kind)?;
                let shutdown_manager = Arc::clone(&self.shutdown_manager);

                tokio::spawn(async move {
                    if stream.recv().await.is_some() {
                        tracing::info!("Received {} signal", name);
                        if let Err(e) = shutdown_manager.initiate_graceful_shutdown().await {
                            tracing::error!("Graceful shutdown failed: {}", e);
                        }
                    }
                });
            }
        }

        #[cfg(windows)]
        {
            let shutdown_manager = Arc::clone(&self.shutdown_manager);

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Received Ctrl+C signal");
                    if let Err(e) = shutdown_manager.initiate_graceful_shutdown().await {
                        tracing::error!("Graceful shutdown failed: {}", e);
                    }
                }
            });
        }

        tracing::info!("Signal handler started");
        Ok(())
    }
}
