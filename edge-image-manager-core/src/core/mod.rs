//! 核心模块
//!
//! 包含错误定义、共享数据类型、持久化、日志和优雅关机

pub mod types;
pub mod error;
pub mod persistence;
pub mod shutdown;
pub mod logging;


pub use types::*;
pub use error::*;
pub use persistence::*;
pub use shutdown::*;
pub use logging::*;
