//! Per-rig device configuration.
//!
//! Each rig has a TOML file `<dir>/<device_id>.toml`. A file may name a `base` device
//! whose values it inherits; the chain is followed to its root and the layers are
//! deep-merged root first, so the most specific file wins per key. Nested tables merge
//! recursively; any other value (including arrays) is replaced whole.
//!
//! # Example
//!
//! ```toml
//! # rig_common.toml
//! [lever]
//! min_rise = 40.0
//! max_flux = 10.0
//! max_std = 8.0
//!
//! [lick]
//! threshold = 200.0
//!
//! [reward]
//! time_coef = [48.5, 12.0]
//! ```
//!
//! ```toml
//! # rig_a.toml
//! base = "rig_common"
//!
//! [lever]
//! min_rise = 55.0
//! ```
//!
//! The resolved configuration is immutable; classifiers are built from it once per
//! session. A missing threshold is an error, never a silent default.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use toml::{Table, Value};
use tracing::debug;

use crate::error::{AppResult, RigError};
use crate::processing::{
    LeverClassifier, LeverConfig, LickClassifier, LickConfig, RewardConfig, RewardConverter,
};

/// Key naming the parent layer.
pub const BASE_KEY: &str = "base";

/// Bookkeeping keys dropped from the resolved configuration.
const RESERVED_KEYS: [&str; 2] = [BASE_KEY, "user_changeable"];

/// Resolved device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Lever classifier thresholds.
    pub lever: LeverConfig,
    /// Lick classifier threshold.
    pub lick: LickConfig,
    /// Reward calibration.
    pub reward: RewardConfig,
}

impl DeviceConfig {
    /// Load and resolve `device_id` from `dir`.
    pub fn load(dir: &Path, device_id: &str) -> AppResult<Self> {
        let table = load_resolved(dir, device_id)?;
        Self::from_table(table)
            .map_err(|err| RigError::Configuration(format!("device '{device_id}': {err}")))
    }

    /// Build from an already merged table.
    pub fn from_table(table: Table) -> AppResult<Self> {
        let config: DeviceConfig = Value::Table(table)
            .try_into()
            .map_err(|err: toml::de::Error| RigError::Configuration(err.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every threshold by building the components that consume them.
    pub fn validate(&self) -> AppResult<()> {
        LeverClassifier::new(self.lever)?;
        LickClassifier::new(self.lick)?;
        RewardConverter::from_config(&self.reward)?;
        Ok(())
    }
}

/// Merge `overlay` into `base`. Tables merge recursively, everything else is replaced.
pub fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Read the `base` chain of `device_id`, most specific layer first.
pub fn load_chain(dir: &Path, device_id: &str) -> AppResult<Vec<Table>> {
    let mut layers = Vec::new();
    let mut seen = HashSet::new();
    let mut current = device_id.to_string();
    loop {
        if !seen.insert(current.clone()) {
            return Err(RigError::Configuration(format!(
                "device configuration '{device_id}' has a base cycle through '{current}'"
            )));
        }
        let path = dir.join(format!("{current}.toml"));
        let text = fs::read_to_string(&path).map_err(|err| {
            RigError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        let table: Table = toml::from_str(&text)?;
        let parent = match table.get(BASE_KEY) {
            None => None,
            Some(Value::String(parent)) => Some(parent.clone()),
            Some(other) => {
                return Err(RigError::Configuration(format!(
                    "{}: '{BASE_KEY}' must be a device name, got {other}",
                    path.display()
                )))
            }
        };
        debug!(layer = %current, parent = ?parent, "Loaded device configuration layer");
        layers.push(table);
        match parent {
            Some(parent) => current = parent,
            None => return Ok(layers),
        }
    }
}

/// Load the `base` chain of `device_id` and merge it into one table.
pub fn load_resolved(dir: &Path, device_id: &str) -> AppResult<Table> {
    let mut layers = load_chain(dir, device_id)?;
    layers.reverse();
    let mut merged = Table::new();
    for layer in layers {
        deep_merge(&mut merged, layer);
    }
    for key in RESERVED_KEYS {
        merged.remove(key);
    }
    Ok(merged)
}

/// Device ids available in `dir`, sorted.
pub fn device_list(dir: &Path) -> AppResult<Vec<String>> {
    let mut devices: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .filter_map(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })
        .collect();
    devices.sort();
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const COMMON: &str = r#"
user_changeable = ["lever"]

[lever]
min_rise = 40.0
max_flux = 10.0
max_std = 8.0

[lick]
threshold = 200.0

[reward]
time_coef = [48.5, 12.0]
"#;

    fn table(text: &str) -> Table {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn deep_merge_child_wins_per_key() {
        let mut base = table("[lever]\nmin_rise = 1.0\nmax_std = 2.0\n[lick]\nthreshold = 3.0");
        deep_merge(&mut base, table("[lever]\nmin_rise = 9.0"));
        assert_eq!(base["lever"]["min_rise"].as_float(), Some(9.0));
        assert_eq!(base["lever"]["max_std"].as_float(), Some(2.0));
        assert_eq!(base["lick"]["threshold"].as_float(), Some(3.0));
    }

    #[test]
    fn deep_merge_replaces_non_tables() {
        let mut base = table("[reward]\ntime_coef = [1.0, 2.0]");
        deep_merge(&mut base, table("reward = 5"));
        assert_eq!(base["reward"].as_integer(), Some(5));
    }

    #[test]
    fn resolves_base_chain() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("common.toml"), COMMON).unwrap();
        fs::write(
            dir.path().join("rig_a.toml"),
            "base = \"common\"\n[lever]\nmin_rise = 55.0\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("rig_a_water.toml"),
            "base = \"rig_a\"\n[reward]\ntime_coef = [50.0, 10.0]\n",
        )
        .unwrap();

        let config = DeviceConfig::load(dir.path(), "rig_a_water").unwrap();
        assert_eq!(config.lever.min_rise, 55.0);
        assert_eq!(config.lever.max_flux, 10.0);
        assert_eq!(config.lick.threshold, 200.0);
        assert_eq!(config.reward.time_coef, [50.0, 10.0]);

        let resolved = load_resolved(dir.path(), "rig_a_water").unwrap();
        assert!(!resolved.contains_key("base"));
        assert!(!resolved.contains_key("user_changeable"));
    }

    #[test]
    fn missing_threshold_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("broken.toml"),
            "[lever]\nmin_rise = 1.0\nmax_flux = 1.0\n[lick]\nthreshold = 1.0\n[reward]\ntime_coef = [1.0, 0.0]\n",
        )
        .unwrap();
        let err = DeviceConfig::load(dir.path(), "broken").unwrap_err();
        assert!(err.to_string().contains("max_std"), "{err}");
    }

    #[test]
    fn base_cycle_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.toml"), "base = \"b\"").unwrap();
        fs::write(dir.path().join("b.toml"), "base = \"a\"").unwrap();
        assert!(matches!(
            load_chain(dir.path(), "a"),
            Err(RigError::Configuration(msg)) if msg.contains("cycle")
        ));
    }

    #[test]
    fn missing_base_file_is_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.toml"), "base = \"nowhere\"").unwrap();
        let err = load_chain(dir.path(), "a").unwrap_err();
        assert!(err.to_string().contains("nowhere.toml"));
    }

    #[test]
    fn negative_threshold_fails_validation() {
        let mut merged = table(COMMON);
        deep_merge(&mut merged, table("[lick]\nthreshold = -1.0"));
        assert!(DeviceConfig::from_table(merged).is_err());
    }

    #[test]
    fn lists_devices() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("rig_b.toml"), COMMON).unwrap();
        fs::write(dir.path().join("rig_a.toml"), COMMON).unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert_eq!(device_list(dir.path()).unwrap(), vec!["rig_a", "rig_b"]);
    }
}
