//! Module loader: resolves contract names to compiled units.
//!
//! Units are deployed through the submission contract and cached here by name.
//! The cache is only a speed-up: on a miss the bytecode is read back through the
//! state driver, so uncommitted deployments are visible too.

use crate::runtime::bytecode::CompiledUnit;
use crate::runtime::runtime_types::VmError;
use crate::state::StateDriver;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
pub struct ModuleLoader {
    cache: HashMap<String, Arc<CompiledUnit>>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self { cache: HashMap::new() }
    }

    pub fn resolve(&mut self, name: &str, driver: &StateDriver) -> Result<Arc<CompiledUnit>, VmError> {
        if let Some(unit) = self.cache.get(name) {
            return Ok(unit.clone());
        }
        let bytes = driver
            .get_compiled(name)
            .map_err(VmError::storage)?
            .ok_or_else(|| VmError::ModuleNotFound(name.to_string()))?;
        let unit = CompiledUnit::from_bytes(&bytes).map_err(|e| VmError::InvalidBytecode(format!("{}: {:#}", name, e)))?;
        let unit = Arc::new(unit);
        trace!(contract = name, "module loaded");
        self.cache.insert(name.to_string(), unit.clone());
        Ok(unit)
    }

    pub fn invalidate(&mut self, name: &str) {
        self.cache.remove(name);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::storage::MemKvStore;

    #[test]
    fn test_missing_module() {
        let driver = StateDriver::new(Arc::new(MemKvStore::new()));
        let mut loader = ModuleLoader::new();
        let err = loader.resolve("ghost", &driver).unwrap_err();
        assert_eq!(err.to_string(), "Module ghost not found");
    }

    #[test]
    fn test_resolve_caches_until_invalidated() {
        let mut driver = StateDriver::new(Arc::new(MemKvStore::new()));
        let unit = compile("counter", "var x; export fn get() { return x.get(); }").unwrap();
        driver.set_contract("counter", "src", &unit.to_bytes().unwrap(), None, "me");

        let mut loader = ModuleLoader::new();
        let loaded = loader.resolve("counter", &driver).unwrap();
        assert_eq!(loaded.name, "counter");
        assert!(loader.is_cached("counter"));

        loader.invalidate("counter");
        assert!(!loader.is_cached("counter"));
        loader.resolve("counter", &driver).unwrap();
        loader.clear();
        assert!(!loader.is_cached("counter"));
    }

    #[test]
    fn test_corrupt_bytecode() {
        let mut driver = StateDriver::new(Arc::new(MemKvStore::new()));
        driver.set_contract("bad", "src", &[0xff, 0x00], None, "me");
        let mut loader = ModuleLoader::new();
        assert!(matches!(loader.resolve("bad", &driver), Err(VmError::InvalidBytecode(_))));
    }
}
