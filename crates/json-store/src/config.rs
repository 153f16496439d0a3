use serde::Deserialize;

use crate::StoreError;

/// Store settings, loadable from TOML.
///
/// ```
/// use json_store::StoreConfig;
///
/// let config = StoreConfig::from_toml_str("label = \"ui\"").unwrap();
/// assert_eq!(config.label, "ui");
/// assert_eq!(config.max_settle_passes, StoreConfig::default().max_settle_passes);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Recorded on every log event the store emits.
    pub label: String,
    /// Upper bound on flushes run by [`Store::settle`](crate::Store::settle).
    pub max_settle_passes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            label: "store".to_string(),
            max_settle_passes: 64,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, StoreError> {
        Ok(toml::from_str(input)?)
    }
}
