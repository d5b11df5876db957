//! 配置管理模块

pub mod settings;

pub use settings::*;

use std::collections::HashMap;
use std::path::Path;

/// 环境变量前缀，嵌套字段用 `__` 分隔，例如 `EDGE_IMAGE__IMAGE_CLEANUP__IMAGES_PER_CYCLE`
pub const ENV_PREFIX: &str = "EDGE_IMAGE";

/// 加载配置文件，环境变量覆盖文件中的值
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings, config::ConfigError> {
    build_settings(Some(path.as_ref()), None)
}

/// 仅从环境变量加载配置
pub fn load_default_config() -> Result<Settings, config::ConfigError> {
    build_settings(None, None)
}

/// `env` 为 None 时读取进程环境变量
fn build_settings(
    file: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<Settings, config::ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path));
    }

    let environment = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .source(env);

    let settings: Settings = builder.add_source(environment).build()?.try_deserialize()?;

    Ok(settings.normalize())
}
