//! Edge Image Manager - 节点守护进程入口

use anyhow::Context;
use async_trait::async_trait;
use edge_image_manager_core::config::{load_config, load_default_config, Settings};
use edge_image_manager_core::container::CliImageRuntime;
use edge_image_manager_core::core::{
    Logger, PersistenceStore, ShutdownConfig, ShutdownError, ShutdownHook, ShutdownHooks,
    ShutdownManager, ShutdownSignal, SignalHandler, StateSaver,
};
use edge_image_manager_core::ImageManager;
use std::sync::Arc;

/// 配置文件路径的环境变量
const CONFIG_PATH_ENV: &str = "EDGE_IMAGE_CONFIG";

/// 回收循环在关机管理器中的组件名
const CLEANUP_COMPONENT: &str = "image_cleanup";

/// 关机前保存镜像清单
struct ImageStateSaveHook {
    manager: Arc<ImageManager>,
}

#[async_trait]
impl ShutdownHook for ImageStateSaveHook {
    async fn on_shutdown(&self, _signal: ShutdownSignal) -> Result<(), ShutdownError> {
        tracing::info!("Saving image states before shutdown...");
        self.manager
            .save_state()
            .await
            .map_err(|e| ShutdownError::HookFailed { message: e.to_string() })?;
        tracing::info!("Image states saved successfully");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 文件是可选的
    let _ = dotenvy::dotenv();

    let settings = load_settings()?;

    // 初始化日志，guard需要一直持有
    let _log_guard = Logger::init(&settings.logging)
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialize logging")?;

    tracing::info!("Starting Edge Image Manager");
    tracing::info!("Loaded configuration: {:?}", settings);

    let runtime = Arc::new(CliImageRuntime::new(
        settings.runtime.binary.clone(),
        settings.runtime.inspect_timeout(),
    ));
    let mut manager = ImageManager::new(runtime, settings.image_cleanup.policy());

    // 打开状态存储并恢复上次保存的镜像清单
    if settings.persistence.enabled {
        let store = PersistenceStore::new(&settings.persistence.data_dir).with_context(|| {
            format!(
                "failed to open image state store at {}",
                settings.persistence.data_dir.display()
            )
        })?;
        let store = Arc::new(store);
        manager = manager.with_saver(Arc::clone(&store) as Arc<dyn StateSaver>);

        match store.load_image_states().await {
            Ok(states) => {
                manager.add_all_image_states(states).await;
            }
            Err(e) => tracing::warn!("Failed to restore image states, starting empty: {}", e),
        }
    } else {
        tracing::info!("Image state persistence disabled");
    }
    let manager = Arc::new(manager);

    // 创建优雅关机管理器
    let shutdown_manager = Arc::new(ShutdownManager::new(ShutdownConfig::default()));
    tracing::info!("Shutdown manager initialized");

    let shutdown_hooks = ShutdownHooks::new();
    if shutdown_manager.config().save_state_on_shutdown {
        shutdown_hooks
            .register_hook(Box::new(ImageStateSaveHook {
                manager: Arc::clone(&manager),
            }))
            .await;
    }

    // 启动周期性镜像回收
    let cleanup_handle = if settings.image_cleanup.enabled {
        shutdown_manager.register_component(CLEANUP_COMPONENT).await;
        Some(Arc::clone(&manager).start_image_cleanup_process(shutdown_manager.cancellation_token()))
    } else {
        tracing::info!("Image cleanup disabled");
        None
    };

    // 订阅要在信号监听启动之前完成，否则可能错过关机广播
    let mut shutdown_rx = shutdown_manager.subscribe();

    // 启动信号处理器
    let signal_handler = SignalHandler::new(Arc::clone(&shutdown_manager));
    signal_handler
        .start_listening()
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to start signal handler")?;

    match shutdown_rx.recv().await {
        Ok(signal) => tracing::info!("Received shutdown signal: {:?}", signal),
        Err(e) => tracing::warn!("Shutdown channel closed: {}", e),
    }

    // 等待正在进行的回收周期结束
    if let Some(handle) = cleanup_handle {
        if let Err(e) = handle.await {
            tracing::error!("Image cleanup task failed: {}", e);
        }
        shutdown_manager.component_shutdown_complete(CLEANUP_COMPONENT).await;
    }

    let failed = shutdown_hooks.execute_hooks(ShutdownSignal::Graceful).await;
    if failed > 0 {
        tracing::warn!("{} shutdown hooks failed", failed);
    }

    if let Err(e) = shutdown_manager.initiate_graceful_shutdown().await {
        tracing::error!("Graceful shutdown failed: {}", e);
    }

    tracing::info!("Edge Image Manager shutdown completed");
    Ok(())
}

fn load_settings() -> anyhow::Result<Settings> {
    settings_from(std::env::var(CONFIG_PATH_ENV).ok())
}

/// 指定了配置文件时必须加载成功，仅使用环境变量时失败回退到默认配置
fn settings_from(config_path: Option<String>) -> anyhow::Result<Settings> {
    if let Some(path) = config_path {
        return load_config(&path).with_context(|| format!("failed to load config file {}", path));
    }

    // 日志系统此时还未初始化
    Ok(load_default_config().unwrap_or_else(|e| {
        eprintln!("Failed to load config from environment ({}), using defaults", e);
        Settings::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("edge-image-manager-{}-{}.toml", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_config_file_is_loaded() {
        let path = write_config("valid", "[image_cleanup]\nimages_per_cycle = 3\n");
        let settings = settings_from(Some(path.display().to_string())).unwrap();
        assert_eq!(settings.image_cleanup.images_per_cycle, 3);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_broken_config_file_is_an_error() {
        let path = write_config("broken", "[image_cleanup\nimages_per_cycle = \n");
        let err = settings_from(Some(path.display().to_string())).unwrap_err();
        assert!(err.to_string().contains("failed to load config file"));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let path = std::env::temp_dir().join("edge-image-manager-does-not-exist.toml");
        assert!(settings_from(Some(path.display().to_string())).is_err());
    }
}
