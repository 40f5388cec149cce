//! Word-sets referenced from patterns and key/value maps used by `<map>`.

use std::collections::{HashMap, HashSet};

/// A named set of phrases. Membership is tested on upper-cased text.
#[derive(Debug, Clone, Default)]
pub struct WordSet {
    name: String,
    phrases: HashSet<String>,
    max_length: usize,
    numeric: bool,
}

impl WordSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_uppercase(),
            ..Default::default()
        }
    }

    pub fn from_phrases<I, S>(name: &str, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new(name);
        for phrase in phrases {
            set.insert(phrase.as_ref());
        }
        set
    }

    /// The built-in `number` set: any run of ASCII digits.
    pub fn number() -> Self {
        Self {
            name: "NUMBER".to_string(),
            phrases: HashSet::new(),
            max_length: 1,
            numeric: true,
        }
    }

    pub fn insert(&mut self, phrase: &str) {
        let words: Vec<&str> = phrase.split_whitespace().collect();
        if words.is_empty() {
            return;
        }
        self.max_length = self.max_length.max(words.len());
        self.phrases.insert(words.join(" ").to_uppercase());
    }

    pub fn contains(&self, phrase: &str) -> bool {
        if self.numeric {
            return !phrase.is_empty() && phrase.bytes().all(|b| b.is_ascii_digit());
        }
        self.phrases.contains(&phrase.to_uppercase())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Longest phrase in words; bounds how far a set match may reach.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty() && !self.numeric
    }
}

/// Key/value lookup behind `<map name="...">`.
pub trait MapLookup: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory map with case-insensitive keys.
#[derive(Debug, Clone, Default)]
pub struct MapTable {
    entries: HashMap<String, String>,
}

impl MapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.trim().to_uppercase(), value.trim().to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for MapTable {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut table = MapTable::new();
        for (k, v) in iter {
            table.insert(k.as_ref(), v.as_ref());
        }
        table
    }
}

impl MapLookup for MapTable {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(&key.trim().to_uppercase()).cloned()
    }
}

/// `<map name="successor">`: n + 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Successor;

impl MapLookup for Successor {
    fn get(&self, key: &str) -> Option<String> {
        key.trim()
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_add(1))
            .map(|n| n.to_string())
    }
}

/// `<map name="predecessor">`: n - 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Predecessor;

impl MapLookup for Predecessor {
    fn get(&self, key: &str) -> Option<String> {
        key.trim()
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .map(|n| n.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_membership_is_case_insensitive() {
        let set = WordSet::from_phrases("color", ["red", "Navy  Blue"]);
        assert!(set.contains("RED"));
        assert!(set.contains("navy blue"));
        assert!(!set.contains("green"));
        assert_eq!(set.max_length(), 2);
        assert_eq!(set.name(), "COLOR");
    }

    #[test]
    fn test_number_set() {
        let set = WordSet::number();
        assert!(set.contains("42"));
        assert!(!set.contains("4x"));
        assert!(!set.contains(""));
    }

    #[test]
    fn test_map_table_keys_fold_case() {
        let map: MapTable = [("France", "Paris")].into_iter().collect();
        assert_eq!(map.get("FRANCE").as_deref(), Some("Paris"));
        assert_eq!(map.get("spain"), None);
    }

    #[test]
    fn test_arithmetic_maps() {
        assert_eq!(Successor.get("41").as_deref(), Some("42"));
        assert_eq!(Predecessor.get(" 1 ").as_deref(), Some("0"));
        assert_eq!(Successor.get("many"), None);
    }
}
