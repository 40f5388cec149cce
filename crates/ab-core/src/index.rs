//! Pattern index: a trie over `pattern <THAT> that <TOPIC> topic` paths.
//!
//! Matching is a depth-first walk that tries branches from most to least
//! specific: literal word, set reference, `_`, shortcut leaf, `*`. A failed
//! branch backtracks into the next one. Wildcards and set references consume
//! one or more words but never cross a segment separator.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::category::Category;
use crate::constants::{DEFAULT_THAT, DEFAULT_TOPIC, THAT_SEPARATOR, TOPIC_SEPARATOR};
use crate::path::{PathToken, input_words, tokenize_path};
use crate::sets::WordSet;

/// Tokens a shortcut leaf stands for: `<THAT> * <TOPIC> *`.
const SHORTCUT_SUFFIX: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StarKind {
    Input,
    That,
    Topic,
}

/// Wildcard and set captures, in the order they were consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StarBindings {
    pub input: Vec<String>,
    pub that: Vec<String>,
    pub topic: Vec<String>,
}

impl StarBindings {
    pub fn get(&self, kind: StarKind) -> &[String] {
        match kind {
            StarKind::Input => &self.input,
            StarKind::That => &self.that,
            StarKind::Topic => &self.topic,
        }
    }

    fn list_mut(&mut self, kind: StarKind) -> &mut Vec<String> {
        match kind {
            StarKind::Input => &mut self.input,
            StarKind::That => &mut self.that,
            StarKind::Topic => &mut self.topic,
        }
    }
}

/// A successful match.
#[derive(Debug, Clone)]
pub struct Match {
    pub category: Arc<Category>,
    pub stars: StarBindings,
}

#[derive(Debug, Clone)]
struct Leaf {
    category: Arc<Category>,
    shortcut: bool,
}

#[derive(Debug)]
struct Node {
    words: HashMap<String, Node>,
    sets: BTreeMap<String, Node>,
    underscore: Option<Box<Node>>,
    star: Option<Box<Node>>,
    leaf: Option<Leaf>,
    /// Fewest path tokens from here to any leaf.
    height: usize,
}

impl Node {
    fn new() -> Self {
        Self {
            words: HashMap::new(),
            sets: BTreeMap::new(),
            underscore: None,
            star: None,
            leaf: None,
            height: usize::MAX,
        }
    }

    fn child_mut(&mut self, token: &PathToken) -> &mut Node {
        match token {
            PathToken::Word(w) => self.words.entry(w.clone()).or_insert_with(Node::new),
            PathToken::Set(name) => self.sets.entry(name.clone()).or_insert_with(Node::new),
            PathToken::Underscore => &mut **self.underscore.get_or_insert_with(|| Box::new(Node::new())),
            PathToken::Star => &mut **self.star.get_or_insert_with(|| Box::new(Node::new())),
            PathToken::That => self
                .words
                .entry(THAT_SEPARATOR.to_string())
                .or_insert_with(Node::new),
            PathToken::Topic => self
                .words
                .entry(TOPIC_SEPARATOR.to_string())
                .or_insert_with(Node::new),
        }
    }

    fn child(&self, token: &PathToken) -> Option<&Node> {
        match token {
            PathToken::Word(w) => self.words.get(w),
            PathToken::Set(name) => self.sets.get(name),
            PathToken::Underscore => self.underscore.as_deref(),
            PathToken::Star => self.star.as_deref(),
            PathToken::That => self.words.get(THAT_SEPARATOR),
            PathToken::Topic => self.words.get(TOPIC_SEPARATOR),
        }
    }

    fn branching(&self) -> usize {
        self.words.len()
            + self.sets.len()
            + usize::from(self.underscore.is_some())
            + usize::from(self.star.is_some())
    }

    fn children(&self) -> impl Iterator<Item = (PathToken, &Node)> {
        let words = self.words.iter().map(|(w, n)| {
            let token = match w.as_str() {
                THAT_SEPARATOR => PathToken::That,
                TOPIC_SEPARATOR => PathToken::Topic,
                _ => PathToken::Word(w.clone()),
            };
            (token, n)
        });
        let sets = self
            .sets
            .iter()
            .map(|(name, n)| (PathToken::Set(name.clone()), n));
        let underscore = self
            .underscore
            .as_deref()
            .map(|n| (PathToken::Underscore, n));
        let star = self.star.as_deref().map(|n| (PathToken::Star, n));
        words.chain(sets).chain(underscore).chain(star)
    }
}

/// Shape statistics over the trie.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub categories: usize,
    pub vocabulary: usize,
    pub nodes: usize,
    pub shortcuts: usize,
    /// Interior nodes with exactly one child.
    pub singletons: usize,
    pub max_branching: usize,
    pub mean_branching: f64,
}

#[derive(Debug)]
pub struct PatternIndex {
    root: Node,
    shortcuts: bool,
    leaf_count: usize,
    vocabulary: HashSet<String>,
}

impl Default for PatternIndex {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PatternIndex {
    /// With `shortcuts`, categories whose that and topic are both `*` end at
    /// the pattern node instead of carrying `<THAT> * <TOPIC> *`.
    pub fn new(shortcuts: bool) -> Self {
        Self {
            root: Node::new(),
            shortcuts,
            leaf_count: 0,
            vocabulary: HashSet::new(),
        }
    }

    /// Store a category under its path. Returns the category it replaced.
    pub fn insert(&mut self, category: Arc<Category>) -> Option<Arc<Category>> {
        let shortcut = self.shortcuts && category.that() == "*" && category.topic() == "*";
        let tokens = if shortcut {
            tokenize_path(category.pattern())
        } else {
            category.path()
        };
        for token in &tokens {
            if let PathToken::Word(w) = token {
                self.vocabulary.insert(w.clone());
            }
        }

        let total = tokens.len() + if shortcut { SHORTCUT_SUFFIX } else { 0 };
        let mut node = &mut self.root;
        for (depth, token) in tokens.iter().enumerate() {
            node.height = node.height.min(total - depth);
            node = node.child_mut(token);
        }
        node.height = node.height.min(total - tokens.len());

        let previous = node.leaf.replace(Leaf { category, shortcut });
        match previous {
            Some(old) => Some(old.category),
            None => {
                self.leaf_count += 1;
                None
            }
        }
    }

    /// Exact path lookup, no wildcard resolution.
    pub fn exists(&self, pattern: &str, that: &str, topic: &str) -> bool {
        let that = if that.trim().is_empty() { "*" } else { that };
        let topic = if topic.trim().is_empty() { "*" } else { topic };
        let shortcut = self.shortcuts && that.trim() == "*" && topic.trim() == "*";
        let tokens = if shortcut {
            tokenize_path(pattern)
        } else {
            crate::path::category_path(pattern, that, topic)
        };
        let mut node = &self.root;
        for token in &tokens {
            match node.child(token) {
                Some(next) => node = next,
                None => return false,
            }
        }
        node.leaf.as_ref().is_some_and(|l| l.shortcut == shortcut)
    }

    /// Most specific category for the input, or `None`.
    pub fn best_match(
        &self,
        input: &str,
        that: &str,
        topic: &str,
        sets: &HashMap<String, WordSet>,
    ) -> Option<Match> {
        let mut path = input_words(input);
        let that_pos = path.len();
        path.push(THAT_SEPARATOR.to_string());
        let that_words = input_words(that);
        if that_words.is_empty() {
            path.push(DEFAULT_THAT.to_string());
        } else {
            path.extend(that_words);
        }
        let topic_pos = path.len();
        path.push(TOPIC_SEPARATOR.to_string());
        let topic_words = input_words(topic);
        if topic_words.is_empty() {
            path.push(DEFAULT_TOPIC.to_string());
        } else {
            path.extend(topic_words);
        }
        let upper: Vec<String> = path.iter().map(|w| w.to_uppercase()).collect();

        let mut walker = Walker {
            path: &path,
            upper: &upper,
            that_pos,
            topic_pos,
            sets,
            stars: StarBindings::default(),
        };
        let leaf = walker.walk(&self.root, 0)?;
        Some(Match {
            category: Arc::clone(&leaf.category),
            stars: walker.stars,
        })
    }

    /// Keep only the categories `keep` accepts, rebuilding the trie so node
    /// heights and vocabulary reflect what is left. Returns how many went.
    pub fn retain(&mut self, keep: impl Fn(&Category) -> bool) -> usize {
        let (kept, dropped): (Vec<_>, Vec<_>) = self
            .leaves()
            .into_iter()
            .map(|(_, category)| category)
            .partition(|category| keep(category));
        if dropped.is_empty() {
            return 0;
        }
        let mut rebuilt = PatternIndex::new(self.shortcuts);
        for category in kept {
            rebuilt.insert(category);
        }
        *self = rebuilt;
        dropped.len()
    }

    pub fn category_count(&self) -> usize {
        self.leaf_count
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Every leaf with the token path that reaches it.
    pub fn leaves(&self) -> Vec<(Vec<PathToken>, Arc<Category>)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        collect_leaves(&self.root, &mut prefix, &mut out);
        out
    }

    /// All categories, ordered by path key.
    pub fn categories(&self) -> Vec<Arc<Category>> {
        let mut cats: Vec<Arc<Category>> = self.leaves().into_iter().map(|(_, c)| c).collect();
        cats.sort_by_key(|c| c.path_key());
        cats
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            categories: self.leaf_count,
            vocabulary: self.vocabulary.len(),
            ..Default::default()
        };
        let mut interior = 0usize;
        let mut branch_total = 0usize;
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            stats.nodes += 1;
            if node.leaf.as_ref().is_some_and(|l| l.shortcut) {
                stats.shortcuts += 1;
            }
            let branching = node.branching();
            if branching > 0 {
                interior += 1;
                branch_total += branching;
                stats.max_branching = stats.max_branching.max(branching);
                if branching == 1 {
                    stats.singletons += 1;
                }
            }
            stack.extend(node.children().map(|(_, n)| n));
        }
        if interior > 0 {
            stats.mean_branching = branch_total as f64 / interior as f64;
        }
        stats
    }
}

fn collect_leaves(
    node: &Node,
    prefix: &mut Vec<PathToken>,
    out: &mut Vec<(Vec<PathToken>, Arc<Category>)>,
) {
    if let Some(leaf) = &node.leaf {
        out.push((prefix.clone(), Arc::clone(&leaf.category)));
    }
    for (token, child) in node.children() {
        prefix.push(token);
        collect_leaves(child, prefix, out);
        prefix.pop();
    }
}

struct Walker<'a> {
    path: &'a [String],
    upper: &'a [String],
    that_pos: usize,
    topic_pos: usize,
    sets: &'a HashMap<String, WordSet>,
    stars: StarBindings,
}

impl<'a> Walker<'a> {
    fn segment(&self, pos: usize) -> (StarKind, usize) {
        if pos < self.that_pos {
            (StarKind::Input, self.that_pos)
        } else if pos < self.topic_pos {
            (StarKind::That, self.topic_pos)
        } else {
            (StarKind::Topic, self.path.len())
        }
    }

    fn walk(&mut self, node: &'a Node, pos: usize) -> Option<&'a Leaf> {
        let remaining = self.path.len() - pos;
        if remaining == 0 {
            return node.leaf.as_ref().filter(|l| !l.shortcut);
        }
        if node.height > remaining {
            return None;
        }

        if pos == self.that_pos {
            if let Some(child) = node.words.get(THAT_SEPARATOR)
                && let Some(leaf) = self.walk(child, pos + 1)
            {
                return Some(leaf);
            }
            let leaf = node.leaf.as_ref().filter(|l| l.shortcut)?;
            self.stars
                .that
                .push(self.path[self.that_pos + 1..self.topic_pos].join(" "));
            self.stars
                .topic
                .push(self.path[self.topic_pos + 1..].join(" "));
            return Some(leaf);
        }
        if pos == self.topic_pos {
            let child = node.words.get(TOPIC_SEPARATOR)?;
            return self.walk(child, pos + 1);
        }

        let (kind, end) = self.segment(pos);
        let (upper, sets) = (self.upper, self.sets);
        let word = &upper[pos];

        if word != THAT_SEPARATOR
            && word != TOPIC_SEPARATOR
            && let Some(child) = node.words.get(word)
            && let Some(leaf) = self.walk(child, pos + 1)
        {
            return Some(leaf);
        }

        for (name, child) in &node.sets {
            let Some(set) = sets.get(name) else {
                continue;
            };
            let longest = set.max_length().min(end - pos);
            for len in 1..=longest {
                let phrase = self.path[pos..pos + len].join(" ");
                if !set.contains(&phrase) {
                    continue;
                }
                if let Some(leaf) = self.capture(child, pos, len, kind) {
                    return Some(leaf);
                }
            }
        }

        if let Some(child) = node.underscore.as_deref() {
            for len in 1..=end - pos {
                if let Some(leaf) = self.capture(child, pos, len, kind) {
                    return Some(leaf);
                }
            }
        }

        if let Some(child) = node.star.as_deref() {
            for len in 1..=end - pos {
                if let Some(leaf) = self.capture(child, pos, len, kind) {
                    return Some(leaf);
                }
            }
        }

        None
    }

    /// Bind `len` words at `pos` and continue; unbind on failure.
    fn capture(
        &mut self,
        child: &'a Node,
        pos: usize,
        len: usize,
        kind: StarKind,
    ) -> Option<&'a Leaf> {
        let captured = self.path[pos..pos + len].join(" ");
        self.stars.list_mut(kind).push(captured);
        let found = self.walk(child, pos + len);
        if found.is_none() {
            self.stars.list_mut(kind).pop();
        }
        found
    }
}
