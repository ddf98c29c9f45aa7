//! Built-in tools for Ember.
//!
//! The agent's own capabilities over its memory: searching what it has been
//! told and recording new facts, corrections and patterns. Leaf tools
//! (clock, device control and so on) live with their integrations and are
//! registered next to these.

pub mod memory_search;
pub mod memory_store;
mod params;

use ember_core::error::RegistryError;
use ember_core::tool::ToolRegistry;
use ember_memory::SharedMemory;

pub use memory_search::MemorySearchTool;
pub use memory_store::MemoryStoreTool;

/// Create a registry holding the built-in memory tools for `memory`.
pub fn default_registry(memory: SharedMemory) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(MemorySearchTool::new(memory.clone())))?;
    registry.register(Box::new(MemoryStoreTool::new(memory)))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_memory::MemoryStore;

    #[test]
    fn default_registry_has_memory_tools() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::open(Some("reg"), dir.path()).unwrap().into_shared();
        let registry = default_registry(memory).unwrap();
        assert_eq!(registry.names(), vec!["memory_search", "memory_store"]);
        assert!(registry.find("memory_store").unwrap().flags().stateful);
    }
}
