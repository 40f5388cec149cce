use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_GET;

/// Named string values. Reading an unset name yields the `unknown` sentinel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicates {
    values: BTreeMap<String, String>,
}

impl Predicates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> String {
        self.values
            .get(name)
            .cloned()
            .unwrap_or_else(|| DEFAULT_GET.to_string())
    }

    pub fn get_opt(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_string(), value.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    /// Copy every entry of `other` over this one.
    pub fn extend_from(&mut self, other: &Predicates) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Predicates {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_reads_sentinel() {
        let p = Predicates::new();
        assert_eq!(p.get("name"), DEFAULT_GET);
        assert!(!p.contains("name"));
    }

    #[test]
    fn test_case_preserved() {
        let mut p = Predicates::new();
        p.set("name", "Bob");
        assert_eq!(p.get("name"), "Bob");
        assert_eq!(p.get_opt("NAME"), None);
    }

    #[test]
    fn test_extend_overrides() {
        let mut a: Predicates = [("x", "1"), ("y", "2")].into_iter().collect();
        let b: Predicates = [("y", "3")].into_iter().collect();
        a.extend_from(&b);
        assert_eq!(a.get("y"), "3");
        assert_eq!(a.len(), 2);
    }
}
