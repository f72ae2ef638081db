//! Product alert plugins: the alert-source capability and its registry.
//!
//! One orchestrator binary serves multiple deployment targets ("products").
//! Each product contributes an alert plugin under the unit name
//! `csm.<product>.plugins.<plugin>`; the registry maps unit names to
//! factories so resolution is a pure lookup plus invocation.

pub mod eos;

use std::collections::HashMap;

use crate::alerts::Alert;
use crate::core::config::Config;
use crate::core::errors::{CsmError, Result};

/// The alert-source capability a product plugin provides.
///
/// The monitor owns the plugin for the process lifetime: `start` before the
/// first poll, `poll` on every tick, `stop` exactly once on shutdown. A
/// `poll` implementation must return within bounded time.
pub trait AlertSource: Send + std::fmt::Debug {
    /// Prepare the source. Called once, before the first poll.
    fn start(&mut self) -> Result<()>;
    /// Collect alerts produced since the previous poll.
    fn poll(&mut self) -> Result<Vec<Alert>>;
    /// Release the source. Called once, after the final poll.
    fn stop(&mut self);
}

/// Factory producing a plugin instance. Construction may fail.
pub type PluginFactory = Box<dyn Fn() -> Result<Box<dyn AlertSource>> + Send + Sync>;

/// Plugin unit name for a product, by fixed naming convention.
#[must_use]
pub fn unit_name(product: &str, plugin: &str) -> String {
    format!("csm.{product}.plugins.{plugin}")
}

/// Registry of plugin factories keyed by unit name.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every plugin linked into this binary, wired to the
    /// configured paths.
    #[must_use]
    pub fn builtin(config: &Config) -> Self {
        let mut registry = Self::new();
        let spool = config.paths.alert_spool.clone();
        registry.register(
            &unit_name(crate::core::config::DEFAULT_PRODUCT, "alert"),
            move || Ok(Box::new(eos::EosAlertPlugin::with_spool(spool.clone())) as Box<dyn AlertSource>),
        );
        registry
    }

    /// Register a factory under a unit name, replacing any previous entry.
    pub fn register<F>(&mut self, unit: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn AlertSource>> + Send + Sync + 'static,
    {
        self.factories.insert(unit.to_string(), Box::new(factory));
    }

    /// Resolve the `plugin` unit for `product` and construct it.
    ///
    /// Fails with a not-found error when no unit is registered under the
    /// constructed name, and with a plugin error when the factory itself
    /// fails. Either failure is fatal at startup: the agent never runs
    /// without a resolved alert source.
    pub fn resolve(&self, product: &str, plugin: &str) -> Result<Box<dyn AlertSource>> {
        let unit = unit_name(product, plugin);
        let factory = self
            .factories
            .get(&unit)
            .ok_or_else(|| CsmError::PluginNotFound { unit: unit.clone() })?;
        factory().map_err(|e| CsmError::PluginFailed {
            unit,
            details: e.to_string(),
        })
    }

    /// Registered unit names, in unspecified order.
    #[must_use]
    pub fn units(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{AlertSource, PluginRegistry, unit_name};
    use crate::alerts::Alert;
    use crate::core::config::Config;
    use crate::core::errors::{CsmError, Result};

    #[derive(Debug)]
    struct NullSource;

    impl AlertSource for NullSource {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn poll(&mut self) -> Result<Vec<Alert>> {
            Ok(Vec::new())
        }
        fn stop(&mut self) {}
    }

    #[test]
    fn unit_names_follow_the_product_convention() {
        assert_eq!(unit_name("eos", "alert"), "csm.eos.plugins.alert");
        assert_eq!(unit_name("acme", "alert"), "csm.acme.plugins.alert");
    }

    #[test]
    fn resolve_constructs_a_registered_plugin() {
        let mut registry = PluginRegistry::new();
        registry.register("csm.acme.plugins.alert", || {
            Ok(Box::new(NullSource) as Box<dyn AlertSource>)
        });
        let mut plugin = registry.resolve("acme", "alert").expect("registered");
        assert!(plugin.poll().unwrap().is_empty());
    }

    #[test]
    fn resolve_unknown_product_is_not_found() {
        let registry = PluginRegistry::builtin(&Config::default());
        let err = registry.resolve("acme", "alert").unwrap_err();
        match err {
            CsmError::PluginNotFound { unit } => assert_eq!(unit, "csm.acme.plugins.alert"),
            other => panic!("expected PluginNotFound, got {other}"),
        }
    }

    #[test]
    fn resolve_surfaces_factory_failure() {
        let mut registry = PluginRegistry::new();
        registry.register("csm.acme.plugins.alert", || {
            Err(CsmError::Runtime {
                details: "bus unavailable".to_string(),
            })
        });
        let err = registry.resolve("acme", "alert").unwrap_err();
        assert_eq!(err.code(), "CSM-3002");
        assert!(err.to_string().contains("bus unavailable"));
    }

    #[test]
    fn builtin_registry_serves_the_default_product() {
        let registry = PluginRegistry::builtin(&Config::default());
        assert!(registry.units().contains(&"csm.eos.plugins.alert".to_string()));
        assert!(registry.resolve("eos", "alert").is_ok());
    }
}
