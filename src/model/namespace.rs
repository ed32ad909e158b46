//! Per-object parameter namespace.

use std::collections::{BTreeMap, BTreeSet};

/// Parameters owned by one scope object.
///
/// `params` are the object's own values and may be overwritten while the
/// model is being resolved. `relative` is the merged view handed to template
/// rendering; insertion there is first-writer-wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameSpace {
    params: BTreeMap<String, String>,
    relative: BTreeMap<String, String>,
    flags: BTreeSet<String>,
}

impl NameSpace {
    pub fn add_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Set a parameter unless it is already present.
    pub fn add_param_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Insert into the relative mapping; an existing key is kept.
    ///
    /// Returns true if the value was inserted.
    pub fn set_relative(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.relative.contains_key(&key) {
            return false;
        }
        self.relative.insert(key, value.into());
        true
    }

    pub fn relative(&self) -> &BTreeMap<String, String> {
        &self.relative
    }

    pub fn replace_relative(&mut self, relative: BTreeMap<String, String>) {
        self.relative = relative;
    }

    pub fn add_flag(&mut self, flag: impl Into<String>) {
        self.flags.insert(flag.into());
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn flags(&self) -> &BTreeSet<String> {
        &self.flags
    }
}
