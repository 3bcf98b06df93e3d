use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::StaticConfig;

static CONFIG: OnceLock<ArcSwap<StaticConfig>> = OnceLock::new();

/// Get the global configuration instance
///
/// Returns an Arc pointer to the configuration, which is cheap to clone
/// and doesn't hold any locks. Falls back to defaults when nothing has been
/// loaded yet, so library callers never panic on an uninitialized config.
pub fn get_config() -> Arc<StaticConfig> {
    CONFIG
        .get_or_init(|| ArcSwap::from_pointee(StaticConfig::default()))
        .load_full()
}

/// Initialize the global configuration from "config.toml" in the current directory.
///
/// If the file doesn't exist, uses in-memory defaults plus `CT__*` environment overrides.
pub fn init_config() {
    init_config_from(None);
}

/// Initialize the global configuration from an explicit path.
///
/// A second call replaces the loaded configuration (used by `-c/--config`).
pub fn init_config_from(path: Option<&str>) {
    let loaded = StaticConfig::load(path);
    match CONFIG.get() {
        Some(existing) => existing.store(Arc::new(loaded)),
        None => {
            let _ = CONFIG.set(ArcSwap::from_pointee(loaded));
        }
    }
}

/// 替换当前配置（测试与嵌入式场景使用）
pub fn set_config(config: StaticConfig) {
    match CONFIG.get() {
        Some(existing) => existing.store(Arc::new(config)),
        None => {
            let _ = CONFIG.set(ArcSwap::from_pointee(config));
        }
    }
}
