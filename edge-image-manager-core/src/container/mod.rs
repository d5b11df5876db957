//! 容器运行时客户端
//!
//! 镜像管理器只通过 [`ImageRuntime`] 访问运行时：查询镜像ID和大小、删除镜像

pub mod runtime;
pub mod cli_runtime;

pub use runtime::*;
pub use cli_runtime::*;
