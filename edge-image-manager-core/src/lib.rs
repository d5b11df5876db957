//! # Edge Image Manager - Core Library
//!
//! 节点级镜像管理核心库：镜像清单、容器引用计数、基于LRU的周期性镜像回收，
//! 以及配套的配置、日志、持久化和优雅关机组件

pub mod core;
pub mod config;
pub mod container;
pub mod image;

/// 重新导出核心类型
pub use self::core::*;
pub use image::{ImageCleanupPolicy, ImageManager};

/// 框架的主要错误类型
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
