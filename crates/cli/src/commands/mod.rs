pub mod config_cmd;
pub mod memory;
pub mod prompt;

use ember_config::AppConfig;
use ember_memory::MemoryStore;

/// Session used when neither `--session` nor the config names one.
pub const DEFAULT_SESSION: &str = "default";

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open the memory store for `session`, falling back to the configured
/// session and then to [`DEFAULT_SESSION`].
pub fn open_store(
    config: &AppConfig,
    session: Option<&str>,
) -> Result<MemoryStore, Box<dyn std::error::Error>> {
    let session = session
        .or(config.memory.session_id.as_deref())
        .unwrap_or(DEFAULT_SESSION);
    let store = MemoryStore::open(Some(session), &config.memory.storage_root)
        .map_err(|e| format!("Failed to open memory session '{session}': {e}"))?;
    Ok(store)
}
