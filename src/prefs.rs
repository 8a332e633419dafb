//! Preference gateway.
//!
//! Values come from a [`PreferenceStore`]; lookups are typed by the default
//! passed in and never fail: a missing key or a value of the wrong type
//! yields the default.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::utils::PrefError;

/// A raw preference value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefValue {
    Bool(bool),
    Str(String),
    Int(i64),
}

/// Source of preference values (host pref service, config file, memory)
pub trait PreferenceStore: Send + Sync + fmt::Debug {
    fn get_value(&self, name: &str) -> Option<PrefValue>;
}

/// Typed, infallible access to a preference store
#[derive(Debug, Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// Gateway over an empty store, every lookup returns its default
    pub fn defaults() -> Self {
        Self::new(Arc::new(MemoryPreferences::default()))
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.store.get_value(name) {
            Some(PrefValue::Bool(value)) => value,
            Some(other) => {
                debug!("Preference {} has unexpected type {:?}, using default", name, other);
                default
            }
            None => default,
        }
    }

    pub fn get_string(&self, name: &str, default: &str) -> String {
        match self.store.get_value(name) {
            Some(PrefValue::Str(value)) => value,
            Some(other) => {
                debug!("Preference {} has unexpected type {:?}, using default", name, other);
                default.to_string()
            }
            None => default.to_string(),
        }
    }

    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        match self.store.get_value(name) {
            Some(PrefValue::Int(value)) => value,
            Some(other) => {
                debug!("Preference {} has unexpected type {:?}, using default", name, other);
                default
            }
            None => default,
        }
    }

    /// Unsigned lookup, negative values fall back to the default
    pub fn get_u64(&self, name: &str, default: u64) -> u64 {
        let value = self.get_int(name, default as i64);
        u64::try_from(value).unwrap_or(default)
    }

    /// Like `get_u64`, but values that do not fit a `u32` fall back too
    pub fn get_u32(&self, name: &str, default: u32) -> u32 {
        let value = self.get_int(name, i64::from(default));
        u32::try_from(value).unwrap_or(default)
    }
}

/// In-memory store, used for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<HashMap<String, PrefValue>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: PrefValue) {
        self.values.write().insert(name.into(), value);
    }

    pub fn with(self, name: impl Into<String>, value: PrefValue) -> Self {
        self.set(name, value);
        self
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_value(&self, name: &str) -> Option<PrefValue> {
        self.values.read().get(name).cloned()
    }
}

/// Store backed by a TOML document; `section.field` names walk nested tables
#[derive(Debug, Clone, Default)]
pub struct TomlPreferences {
    table: toml::Table,
}

impl TomlPreferences {
    pub fn parse(contents: &str) -> Result<Self, PrefError> {
        let table = contents.parse::<toml::Table>()?;
        Ok(Self { table })
    }

    pub fn load(path: &Path) -> Result<Self, PrefError> {
        debug!("Loading preferences from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }
}

impl PreferenceStore for TomlPreferences {
    fn get_value(&self, name: &str) -> Option<PrefValue> {
        let mut parts = name.split('.').peekable();
        let mut table = &self.table;

        while let Some(part) = parts.next() {
            let value = table.get(part)?;
            if parts.peek().is_none() {
                trace!("Preference {} resolved to {:?}", name, value);
                return match value {
                    toml::Value::Boolean(b) => Some(PrefValue::Bool(*b)),
                    toml::Value::String(s) => Some(PrefValue::Str(s.clone())),
                    toml::Value::Integer(i) => Some(PrefValue::Int(*i)),
                    _ => None,
                };
            }
            table = value.as_table()?;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let prefs = Preferences::defaults();
        assert!(prefs.get_bool("pods.stable_focus", true));
        assert_eq!(prefs.get_string("renaming.model", "m"), "m");
        assert_eq!(prefs.get_int("pods.autohide_delay_ms", 15000), 15000);
    }

    #[test]
    fn test_wrong_type_falls_back() {
        let store = MemoryPreferences::new().with("a.flag", PrefValue::Str("yes".to_string()));
        let prefs = Preferences::new(Arc::new(store));
        assert!(!prefs.get_bool("a.flag", false));
        assert_eq!(prefs.get_string("a.flag", ""), "yes");
    }

    #[test]
    fn test_negative_unsigned_falls_back() {
        let store = MemoryPreferences::new().with("a.delay", PrefValue::Int(-5));
        let prefs = Preferences::new(Arc::new(store));
        assert_eq!(prefs.get_u64("a.delay", 10), 10);
    }

    #[test]
    fn test_oversized_u32_falls_back() {
        let store = MemoryPreferences::new()
            .with("layout.pod_width", PrefValue::Int(i64::from(u32::MAX) + 1))
            .with("layout.pod_overlap", PrefValue::Int(32));
        let prefs = Preferences::new(Arc::new(store));
        assert_eq!(prefs.get_u32("layout.pod_width", 56), 56);
        assert_eq!(prefs.get_u32("layout.pod_overlap", 40), 32);
    }

    #[test]
    fn test_toml_dotted_lookup() {
        let store = TomlPreferences::parse(
            r#"
            [pods]
            stable_focus = false
            autohide_delay_ms = 2000

            [renaming]
            model = "pixtral-12b"
            "#,
        )
        .unwrap();
        let prefs = Preferences::new(Arc::new(store));

        assert!(!prefs.get_bool("pods.stable_focus", true));
        assert_eq!(prefs.get_int("pods.autohide_delay_ms", 0), 2000);
        assert_eq!(prefs.get_string("renaming.model", ""), "pixtral-12b");
        assert_eq!(prefs.get_int("pods.missing", 7), 7);
        assert_eq!(prefs.get_int("nope.deeper.still", 3), 3);
    }
}
