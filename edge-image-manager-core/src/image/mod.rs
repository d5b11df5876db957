//! 镜像清单与镜像生命周期管理
//!
//! - [`ImageState`]：单个镜像的别名、容器引用和时间戳
//! - [`ImageInventory`]：镜像ID到镜像状态的映射，纯数据，无I/O
//! - [`ImageManager`]：持有清单，处理容器引用的增删，并运行周期性的LRU回收

pub mod state;
pub mod inventory;
pub mod policy;
pub mod manager;

pub use state::*;
pub use inventory::*;
pub use policy::*;
pub use manager::*;
