//! Scoped variable table
//!
//! Every name can be defined once per [`VariableScope`]. Lookups return the
//! value from the highest scope that defines the name
//! (`System < UserDefined < Computed`); a later registration in the same
//! scope replaces the earlier one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::ast::Accessor;

/// Tier a variable belongs to, ordered by precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableScope {
    /// Built-in values such as the current date
    System,
    /// Caller-supplied and front-matter values
    UserDefined,
    /// Values computed while compiling (`#set`, pattern-actions)
    Computed,
}

/// Coarse value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    /// Text
    String,
    /// `true` / `false`
    Boolean,
    /// Integer or float
    Number,
    /// List
    Array,
    /// Map
    Object,
    /// `null` or not known
    Unknown,
}

impl VariableType {
    /// Infer the type of a JSON value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => VariableType::String,
            Value::Bool(_) => VariableType::Boolean,
            Value::Number(_) => VariableType::Number,
            Value::Array(_) => VariableType::Array,
            Value::Object(_) => VariableType::Object,
            Value::Null => VariableType::Unknown,
        }
    }
}

/// One registered variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEntry {
    /// Variable name
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub var_type: VariableType,
    /// Value
    pub value: Value,
    /// Scope it was registered in
    pub scope: VariableScope,
}

impl VariableEntry {
    /// Text form used when the variable is interpolated
    pub fn display(&self) -> String {
        display_value(&self.value)
    }
}

/// Text form of a value: strings are inserted as-is, `null` as nothing,
/// everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Scoped symbol store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableTable {
    entries: BTreeMap<String, BTreeMap<VariableScope, VariableEntry>>,
}

impl VariableTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` in `scope`, replacing any earlier value in that scope
    pub fn add(
        &mut self,
        name: impl Into<String>,
        var_type: VariableType,
        value: impl Into<Value>,
        scope: VariableScope,
    ) {
        let name = name.into();
        let entry = VariableEntry {
            name: name.clone(),
            var_type,
            value: value.into(),
            scope,
        };
        self.entries.entry(name).or_default().insert(scope, entry);
    }

    /// Register `name` with its type inferred from the value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>, scope: VariableScope) {
        let value = value.into();
        self.add(name, VariableType::of(&value), value, scope);
    }

    /// Resolved value of `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entry(name).map(|e| &e.value)
    }

    /// Resolved entry of `name`
    pub fn entry(&self, name: &str) -> Option<&VariableEntry> {
        self.entries
            .get(name)
            .and_then(|scopes| scopes.values().next_back())
    }

    /// Whether any scope defines `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of distinct names
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `name` followed by accessors as far as they go.
    ///
    /// Returns the value reached and how many accessors were applied. `None`
    /// when the name itself is not defined.
    pub fn resolve_path(&self, name: &str, accessors: &[Accessor]) -> Option<(Value, usize)> {
        let mut current = self.get(name)?;
        for (applied, accessor) in accessors.iter().enumerate() {
            let next = match (accessor, current) {
                (Accessor::Property(key) | Accessor::Key(key), Value::Object(map)) => map.get(key),
                (Accessor::Index(idx), Value::Array(items)) => items.get(*idx),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Some((current.clone(), applied)),
            }
        }
        Some((current.clone(), accessors.len()))
    }

    /// Resolve a full path; `None` unless every accessor applies
    pub fn resolve(&self, name: &str, accessors: &[Accessor]) -> Option<Value> {
        match self.resolve_path(name, accessors)? {
            (value, applied) if applied == accessors.len() => Some(value),
            _ => None,
        }
    }

    /// Resolved entries in name order
    pub fn iter(&self) -> impl Iterator<Item = &VariableEntry> {
        self.entries
            .values()
            .filter_map(|scopes| scopes.values().next_back())
    }

    /// Resolved values keyed by name, for expression evaluation
    pub fn to_context(&self) -> BTreeMap<String, Value> {
        self.iter()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect()
    }

    /// Copy every entry of `other` into this table, scope by scope
    pub fn extend(&mut self, other: &VariableTable) {
        for scopes in other.entries.values() {
            for entry in scopes.values() {
                self.add(
                    entry.name.clone(),
                    entry.var_type,
                    entry.value.clone(),
                    entry.scope,
                );
            }
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for VariableTable {
    /// Collect `UserDefined` variables
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = VariableTable::new();
        for (name, value) in iter {
            table.set(name, value, VariableScope::UserDefined);
        }
        table
    }
}

impl fmt::Display for VariableTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.iter() {
            writeln!(f, "{} = {}", entry.name, entry.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_precedence() {
        let mut table = VariableTable::new();
        table.set("x", "computed", VariableScope::Computed);
        table.set("x", "system", VariableScope::System);
        table.set("x", "user", VariableScope::UserDefined);
        assert_eq!(table.get("x"), Some(&json!("computed")));
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_later_registration_in_scope_wins() {
        let mut table = VariableTable::new();
        table.set("x", 1, VariableScope::UserDefined);
        table.set("x", 2, VariableScope::UserDefined);
        assert_eq!(table.get("x"), Some(&json!(2)));
        assert_eq!(table.entry("x").unwrap().var_type, VariableType::Number);
    }

    #[test]
    fn test_missing_name() {
        let table = VariableTable::new();
        assert!(!table.contains("nope"));
        assert!(table.get("nope").is_none());
        assert!(table.resolve_path("nope", &[]).is_none());
    }

    #[test]
    fn test_resolve_accessors() {
        let mut table = VariableTable::new();
        table.set(
            "user",
            json!({"name": "Ada", "tags": ["a", "b"]}),
            VariableScope::UserDefined,
        );
        let path = [Accessor::Property("tags".into()), Accessor::Index(1)];
        assert_eq!(table.resolve("user", &path), Some(json!("b")));
        assert_eq!(
            table.resolve("user", &[Accessor::Key("name".into())]),
            Some(json!("Ada"))
        );
        assert!(table.resolve("user", &[Accessor::Property("age".into())]).is_none());
    }

    #[test]
    fn test_resolve_path_stops_at_scalar() {
        let table: VariableTable = [("name", "Bob")].into_iter().collect();
        let (value, applied) = table
            .resolve_path("name", &[Accessor::Property("Welcome".into())])
            .unwrap();
        assert_eq!(value, json!("Bob"));
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("héllo ✓")), "héllo ✓");
        assert_eq!(display_value(&json!(null)), "");
        assert_eq!(display_value(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn test_extend_keeps_scopes() {
        let mut base = VariableTable::new();
        base.set("a", "sys", VariableScope::System);
        let mut other = VariableTable::new();
        other.set("a", "user", VariableScope::UserDefined);
        base.extend(&other);
        assert_eq!(base.get("a"), Some(&json!("user")));
    }

    #[test]
    fn test_read_access_is_side_effect_free() {
        let table: VariableTable = [("a", 1)].into_iter().collect();
        let before = table.clone();
        let _ = table.get("a");
        let _ = table.resolve("a", &[Accessor::Index(0)]);
        let _ = table.to_context();
        assert_eq!(table, before);
    }
}
