//! Relational memory: subject/predicate/object triples with conjunctive
//! queries.
//!
//! Literals compare case-insensitively; stored values keep their case.
//! Query results are interned as named tuples so a template can come back for
//! one field later without re-running the query.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triple {
    pub id: u64,
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// One conjunct of a query. Fields starting with `?` are variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub subj: String,
    pub pred: String,
    pub obj: String,
    pub affirmative: bool,
}

impl Clause {
    pub fn new(subj: &str, pred: &str, obj: &str) -> Self {
        Self {
            subj: subj.trim().to_string(),
            pred: pred.trim().to_string(),
            obj: obj.trim().to_string(),
            affirmative: true,
        }
    }

    pub fn negated(subj: &str, pred: &str, obj: &str) -> Self {
        Self {
            affirmative: false,
            ..Self::new(subj, pred, obj)
        }
    }

    fn fields(&self) -> [&str; 3] {
        [&self.subj, &self.pred, &self.obj]
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.fields().into_iter().filter(|f| is_variable(f))
    }
}

pub fn is_variable(field: &str) -> bool {
    field.starts_with('?')
}

/// A variable binding produced by a query.
pub type Bindings = BTreeMap<String, String>;

#[derive(Debug, Default)]
struct TripleStore {
    triples: BTreeMap<u64, Triple>,
    keys: HashMap<[String; 3], u64>,
    by_subject: HashMap<String, BTreeSet<u64>>,
    by_predicate: HashMap<String, BTreeSet<u64>>,
    by_object: HashMap<String, BTreeSet<u64>>,
    next_id: u64,
}

fn key(s: &str, p: &str, o: &str) -> [String; 3] {
    [s.to_uppercase(), p.to_uppercase(), o.to_uppercase()]
}

impl TripleStore {
    fn add(&mut self, s: &str, p: &str, o: &str) -> Option<u64> {
        let (s, p, o) = (s.trim(), p.trim(), o.trim());
        if s.is_empty() || p.is_empty() || o.is_empty() {
            return None;
        }
        let k = key(s, p, o);
        if let Some(id) = self.keys.get(&k) {
            return Some(*id);
        }
        self.next_id += 1;
        let id = self.next_id;
        let [ks, kp, ko] = k.clone();
        self.by_subject.entry(ks).or_default().insert(id);
        self.by_predicate.entry(kp).or_default().insert(id);
        self.by_object.entry(ko).or_default().insert(id);
        self.keys.insert(k, id);
        self.triples.insert(
            id,
            Triple {
                id,
                subject: s.to_string(),
                predicate: p.to_string(),
                object: o.to_string(),
            },
        );
        Some(id)
    }

    fn delete(&mut self, s: &str, p: &str, o: &str) -> bool {
        let k = key(s.trim(), p.trim(), o.trim());
        let Some(id) = self.keys.remove(&k) else {
            return false;
        };
        let [ks, kp, ko] = k;
        for (index, field) in [
            (&mut self.by_subject, ks),
            (&mut self.by_predicate, kp),
            (&mut self.by_object, ko),
        ] {
            if let Some(ids) = index.get_mut(&field) {
                ids.remove(&id);
                if ids.is_empty() {
                    index.remove(&field);
                }
            }
        }
        self.triples.remove(&id);
        true
    }

    /// Triples agreeing with every bound position, in insertion order.
    fn matching(&self, s: Option<&str>, p: Option<&str>, o: Option<&str>) -> Vec<&Triple> {
        let mut candidates: Option<BTreeSet<u64>> = None;
        for (index, value) in [
            (&self.by_subject, s),
            (&self.by_predicate, p),
            (&self.by_object, o),
        ] {
            let Some(value) = value else {
                continue;
            };
            let ids = index.get(&value.to_uppercase()).cloned().unwrap_or_default();
            candidates = Some(match candidates {
                Some(prev) => prev.intersection(&ids).copied().collect(),
                None => ids,
            });
        }
        match candidates {
            Some(ids) => ids.iter().filter_map(|id| self.triples.get(id)).collect(),
            None => self.triples.values().collect(),
        }
    }
}

/// Bounded name → binding registry; the oldest tuple goes first.
#[derive(Debug)]
struct TupleRegistry {
    by_name: HashMap<String, Bindings>,
    by_binding: HashMap<Bindings, String>,
    order: VecDeque<String>,
    capacity: usize,
    counter: u64,
}

impl TupleRegistry {
    fn new(capacity: usize) -> Self {
        Self {
            by_name: HashMap::new(),
            by_binding: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            counter: 0,
        }
    }

    fn intern(&mut self, bindings: Bindings) -> String {
        if let Some(name) = self.by_binding.get(&bindings) {
            return name.clone();
        }
        self.counter += 1;
        let name = format!("tuple{}", self.counter);
        self.by_name.insert(name.clone(), bindings.clone());
        self.by_binding.insert(bindings, name.clone());
        self.order.push_back(name.clone());
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front()
                && let Some(b) = self.by_name.remove(&old)
            {
                self.by_binding.remove(&b);
            }
        }
        name
    }

    fn get(&self, name: &str) -> Option<&Bindings> {
        self.by_name.get(&name.trim().to_lowercase())
    }
}

#[derive(Debug)]
pub struct RelationalMemory {
    store: RwLock<TripleStore>,
    tuples: Mutex<TupleRegistry>,
}

impl Default for RelationalMemory {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl RelationalMemory {
    pub fn new(max_tuples: usize) -> Self {
        Self {
            store: RwLock::new(TripleStore::default()),
            tuples: Mutex::new(TupleRegistry::new(max_tuples)),
        }
    }

    /// Returns false when a field is empty. Adding a present triple is a no-op.
    pub fn add_triple(&self, subject: &str, predicate: &str, object: &str) -> bool {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.add(subject, predicate, object).is_some()
    }

    /// Returns false when the triple was not present.
    pub fn delete_triple(&self, subject: &str, predicate: &str, object: &str) -> bool {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.delete(subject, predicate, object)
    }

    pub fn triples(&self) -> Vec<Triple> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.triples.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Left-to-right join of the clauses, projected onto `visible`
    /// (every clause variable when `visible` is empty), without duplicates.
    pub fn query(&self, visible: &[String], clauses: &[Clause]) -> Vec<Bindings> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut partials: Vec<Bindings> = vec![Bindings::new()];
        for clause in clauses {
            let mut next = Vec::new();
            for binding in &partials {
                let extended = extend(&store, binding, clause);
                if clause.affirmative {
                    next.extend(extended);
                } else if extended.is_empty() {
                    next.push(binding.clone());
                }
            }
            partials = next;
            if partials.is_empty() {
                break;
            }
        }
        drop(store);

        let clause_vars: BTreeSet<&str> = clauses.iter().flat_map(Clause::variables).collect();
        let projection: Vec<&str> = if visible.is_empty() {
            clause_vars.iter().copied().collect()
        } else {
            visible
                .iter()
                .map(String::as_str)
                .filter(|v| clause_vars.contains(v))
                .collect()
        };

        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for binding in partials {
            let projected: Bindings = projection
                .iter()
                .filter_map(|v| binding.get(*v).map(|value| (v.to_string(), value.clone())))
                .collect();
            if seen.insert(projected.clone()) {
                out.push(projected);
            }
        }
        out
    }

    /// Run a query and intern each result; returns the tuple names.
    pub fn select(&self, visible: &[String], clauses: &[Clause]) -> Vec<String> {
        let results = self.query(visible, clauses);
        let mut registry = self.tuples.lock().unwrap_or_else(PoisonError::into_inner);
        results
            .into_iter()
            .map(|bindings| registry.intern(bindings))
            .collect()
    }

    /// One field of a previously interned tuple.
    pub fn tuple_value(&self, tuple: &str, variable: &str) -> Option<String> {
        let registry = self.tuples.lock().unwrap_or_else(PoisonError::into_inner);
        registry.get(tuple)?.get(variable.trim()).cloned()
    }
}

/// Bindings extending `binding` through every triple consistent with `clause`.
fn extend(store: &TripleStore, binding: &Bindings, clause: &Clause) -> Vec<Bindings> {
    let resolve = |field: &str| -> Option<String> {
        if is_variable(field) {
            binding.get(field).cloned()
        } else {
            Some(field.to_string())
        }
    };
    let (s, p, o) = (resolve(&clause.subj), resolve(&clause.pred), resolve(&clause.obj));
    let mut out = Vec::new();
    'triples: for triple in store.matching(s.as_deref(), p.as_deref(), o.as_deref()) {
        let mut next = binding.clone();
        for (field, value) in clause.fields().into_iter().zip([
            &triple.subject,
            &triple.predicate,
            &triple.object,
        ]) {
            if !is_variable(field) {
                continue;
            }
            match next.get(field) {
                Some(bound) if !bound.eq_ignore_ascii_case(value) => continue 'triples,
                Some(_) => {}
                None => {
                    next.insert(field.to_string(), value.clone());
                }
            }
        }
        out.push(next);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> RelationalMemory {
        let m = RelationalMemory::new(100);
        m.add_triple("bob", "likes", "pizza");
        m.add_triple("alice", "likes", "pizza");
        m.add_triple("alice", "likes", "sushi");
        m.add_triple("alice", "is", "robot");
        m
    }

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_clause() {
        let m = memory();
        let rows = m.query(&[], &[Clause::new("?x", "likes", "pizza")]);
        let names: Vec<&str> = rows.iter().map(|r| r["?x"].as_str()).collect();
        assert_eq!(names, vec!["bob", "alice"]);
    }

    #[test]
    fn test_literals_ignore_case() {
        let m = memory();
        let rows = m.query(&[], &[Clause::new("?x", "LIKES", "Pizza")]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_join_and_negation() {
        let m = memory();
        let clauses = [
            Clause::new("?x", "likes", "pizza"),
            Clause::negated("?x", "is", "robot"),
        ];
        let rows = m.query(&vars(&["?x"]), &clauses);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["?x"], "bob");
    }

    #[test]
    fn test_shared_variable_join() {
        let m = memory();
        let clauses = [
            Clause::new("bob", "likes", "?food"),
            Clause::new("?who", "likes", "?food"),
        ];
        let rows = m.query(&vars(&["?who"]), &clauses);
        let who: Vec<&str> = rows.iter().map(|r| r["?who"].as_str()).collect();
        assert_eq!(who, vec!["bob", "alice"]);
    }

    #[test]
    fn test_projection_dedupes() {
        let m = memory();
        let rows = m.query(&vars(&["?x"]), &[Clause::new("?x", "likes", "?y")]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_bound_variables_come_from_clauses() {
        let m = memory();
        let rows = m.query(&vars(&["?x", "?nope"]), &[Clause::new("?x", "likes", "?y")]);
        for row in rows {
            assert!(row.keys().all(|k| k == "?x"));
        }
    }

    #[test]
    fn test_delete_removes_from_results() {
        let m = memory();
        assert!(m.delete_triple("BOB", "likes", "pizza"));
        assert!(!m.delete_triple("bob", "likes", "pizza"));
        let rows = m.query(&[], &[Clause::new("?x", "likes", "pizza")]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_add_rejects_empty_and_ignores_duplicates() {
        let m = RelationalMemory::new(10);
        assert!(!m.add_triple("", "likes", "pizza"));
        assert!(m.add_triple("bob", "likes", "pizza"));
        assert!(m.add_triple("Bob", "Likes", "Pizza"));
        assert_eq!(m.len(), 1);
        assert_eq!(m.triples()[0].subject, "bob");
    }

    #[test]
    fn test_select_interns_tuples() {
        let m = memory();
        let clauses = [Clause::new("?x", "likes", "pizza")];
        let names = m.select(&vars(&["?x"]), &clauses);
        assert_eq!(names.len(), 2);
        assert_eq!(m.tuple_value(&names[0], "?x").as_deref(), Some("bob"));
        assert_eq!(m.tuple_value(&names[0].to_uppercase(), "?x").as_deref(), Some("bob"));
        assert_eq!(m.select(&vars(&["?x"]), &clauses), names);
        assert_eq!(m.tuple_value("tuple999", "?x"), None);
    }

    #[test]
    fn test_registry_evicts_oldest() {
        let m = RelationalMemory::new(1);
        m.add_triple("a", "is", "b");
        m.add_triple("c", "is", "d");
        let first = m.select(&[], &[Clause::new("a", "is", "?x")]);
        let second = m.select(&[], &[Clause::new("c", "is", "?x")]);
        assert_eq!(m.tuple_value(&first[0], "?x"), None);
        assert_eq!(m.tuple_value(&second[0], "?x").as_deref(), Some("d"));
    }
}
