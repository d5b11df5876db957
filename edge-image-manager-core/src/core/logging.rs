//! 日志系统初始化

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingSettings};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志初始化器
pub struct Logger;

impl Logger {
    /// 构建日志过滤器，RUST_LOG 优先于配置中的级别
    pub fn filter(settings: &LoggingSettings) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
    }

    /// 初始化日志系统
    ///
    /// 配置了日志文件时返回后台写线程的guard，调用方需要持有它直到进程退出
    pub fn init(settings: &LoggingSettings) -> crate::Result<Option<WorkerGuard>> {
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        // 控制台输出层
        if settings.console_output {
            let layer: BoxedLayer = match settings.format {
                LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
                LogFormat::Text => tracing_subscriber::fmt::layer().with_target(false).compact().boxed(),
            };
            layers.push(layer);
        }

        // 文件输出层
        if let Some(file_path) = &settings.file_path {
            let directory = file_path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "edge-image-manager.log".to_string());

            std::fs::create_dir_all(directory)?;

            let appender = RollingFileAppender::new(Rotation::DAILY, directory, file_name);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);

            let layer: BoxedLayer = match settings.format {
                LogFormat::Json => tracing_subscriber::fmt::layer().json().with_writer(writer).boxed(),
                LogFormat::Text => tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .boxed(),
            };
            layers.push(layer);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(Self::filter(settings))
            .try_init()?;

        Ok(guard)
    }
}
