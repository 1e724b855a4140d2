//! ConfigStore - process-wide named integer parameters.
//!
//! The store is seeded with every [`Param`] at its default. Only those names
//! exist: lookups and updates of any other name fail with
//! `UnknownParameter`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{VpsError, VpsResult};

use super::params::Param;

#[derive(Debug)]
pub struct ConfigStore {
    values: RwLock<HashMap<String, i32>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(
                Param::ALL
                    .into_iter()
                    .map(|p| (p.name().to_string(), p.default_value()))
                    .collect(),
            ),
        }
    }

    pub fn get_integer(&self, name: &str) -> VpsResult<i32> {
        self.values
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| VpsError::UnknownParameter(name.to_string()))
    }

    pub fn set_integer(&self, name: &str, value: i32) -> VpsResult<()> {
        let param =
            Param::from_name(name).ok_or_else(|| VpsError::UnknownParameter(name.to_string()))?;
        if value < param.minimum() {
            return Err(VpsError::InvalidInput(format!(
                "{name} must be >= {}, got {value}",
                param.minimum()
            )));
        }
        self.values.write().insert(name.to_string(), value);
        debug!("config {} = {}", name, value);
        Ok(())
    }

    /// Typed read of a known knob.
    pub fn get(&self, param: Param) -> i32 {
        self.values
            .read()
            .get(param.name())
            .copied()
            .unwrap_or_else(|| param.default_value())
    }

    /// Apply a YAML mapping of `name: value` on top of the current values.
    ///
    /// Every entry is checked before any is applied, so a bad file leaves the
    /// store untouched.
    pub fn load_yaml(&self, path: &Path) -> anyhow::Result<()> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        self.apply_yaml(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(())
    }

    pub fn apply_yaml(&self, yaml: &str) -> anyhow::Result<()> {
        let entries: HashMap<String, i32> = serde_yaml::from_str(yaml)?;

        for (name, value) in &entries {
            let param =
                Param::from_name(name).ok_or_else(|| VpsError::UnknownParameter(name.clone()))?;
            if *value < param.minimum() {
                anyhow::bail!("{name} must be >= {}, got {value}", param.minimum());
            }
        }

        let mut values = self.values.write();
        for (name, value) in entries {
            values.insert(name, value);
        }
        Ok(())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let store = ConfigStore::new();
        assert_eq!(store.get_integer("MinimumMatchCount").unwrap(), 30);
        assert_eq!(store.get(Param::LocalizationMaxPixels), 960 * 720);
    }

    #[test]
    fn test_unknown_parameter() {
        let store = ConfigStore::new();
        assert!(matches!(
            store.get_integer("NoSuchKnob"),
            Err(VpsError::UnknownParameter(name)) if name == "NoSuchKnob"
        ));
        assert!(matches!(
            store.set_integer("NoSuchKnob", 1),
            Err(VpsError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_set_and_minimum() {
        let store = ConfigStore::new();
        store.set_integer("AcceptImmediatelyConfidence", 80).unwrap();
        assert_eq!(store.get(Param::AcceptImmediatelyConfidence), 80);

        assert!(matches!(
            store.set_integer("MatchingBudgetMs", 0),
            Err(VpsError::InvalidInput(_))
        ));
        assert_eq!(store.get(Param::MatchingBudgetMs), 2000);
    }

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MinimumMatchCount: 50\nLocalizationMaxPixels: 0").unwrap();

        let store = ConfigStore::new();
        store.load_yaml(file.path()).unwrap();
        assert_eq!(store.get(Param::MinimumMatchCount), 50);
        assert_eq!(store.get(Param::LocalizationMaxPixels), 0);
    }

    #[test]
    fn test_yaml_unknown_name_leaves_store_untouched() {
        let store = ConfigStore::new();
        let err = store
            .apply_yaml("MinimumMatchCount: 50\nBogus: 1\n")
            .unwrap_err();
        assert!(err.to_string().contains("Bogus"));
        assert_eq!(store.get(Param::MinimumMatchCount), 30);
    }
}
