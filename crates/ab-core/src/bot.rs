//! A bot: its categories, word-sets, maps, properties, relational memory and
//! collaborators, shared by every session talking to it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::category::Category;
use crate::config::BotConfig;
use crate::constants::{LEARN_FILE, LEARNF_FILE};
use crate::error::Result;
use crate::extension::TagExtension;
use crate::index::{IndexStats, Match, PatternIndex};
use crate::normalizer::{Normalizer, SubstitutionNormalizer};
use crate::predicates::Predicates;
use crate::service::ExternalService;
use crate::sets::{MapLookup, Predecessor, Successor, WordSet};
use crate::template::Persistence;
use crate::triples::RelationalMemory;

/// Outcome of loading a batch of categories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: usize,
    /// `(source, reason)` for every rejected category or file.
    pub rejected: Vec<(String, String)>,
}

impl LoadReport {
    pub fn merge(&mut self, other: LoadReport) {
        self.loaded += other.loaded;
        self.rejected.extend(other.rejected);
    }

    pub fn reject(&mut self, source: impl Into<String>, reason: impl Into<String>) {
        self.rejected.push((source.into(), reason.into()));
    }
}

pub struct Bot {
    name: String,
    config: BotConfig,
    index: RwLock<PatternIndex>,
    memory: RelationalMemory,
    sets: HashMap<String, WordSet>,
    maps: HashMap<String, Arc<dyn MapLookup>>,
    properties: HashMap<String, String>,
    default_predicates: Predicates,
    pronouns: HashSet<String>,
    normalizer: Arc<dyn Normalizer>,
    service: Option<Arc<dyn ExternalService>>,
    extensions: Vec<Arc<dyn TagExtension>>,
    pending_learnf: Mutex<Vec<Arc<Category>>>,
    /// Set by `<resetlearnf/>` until the store has dropped its copies.
    learnf_reset: AtomicBool,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("name", &self.name)
            .field("categories", &self.category_count())
            .field("sets", &self.sets.len())
            .field("maps", &self.maps.len())
            .field("triples", &self.memory.len())
            .finish()
    }
}

impl Bot {
    pub fn builder(name: &str) -> BotBuilder {
        BotBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    fn read_index(&self) -> RwLockReadGuard<'_, PatternIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, PatternIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and index one category. A category already stored under the
    /// same path is replaced.
    pub fn add_category(&self, category: Category) -> Result<Arc<Category>> {
        category.validate()?;
        let category = Arc::new(category);
        if let Some(old) = self.write_index().insert(Arc::clone(&category)) {
            debug!(path = %old.path_key(), "replaced category");
        }
        Ok(category)
    }

    /// Index every valid category; invalid ones are reported and skipped.
    pub fn add_categories(&self, categories: impl IntoIterator<Item = Category>) -> LoadReport {
        let mut report = LoadReport::default();
        for category in categories {
            let source = format!("{}: {}", category.filename(), category.path_key());
            match self.add_category(category) {
                Ok(_) => report.loaded += 1,
                Err(e) => {
                    warn!("rejected category {source}: {e}");
                    report.reject(source, e.to_string());
                }
            }
        }
        report
    }

    /// Index a category authored at runtime. Persistent ones are queued for
    /// the store, see [`Bot::take_pending_learnf`].
    pub fn learn(
        &self,
        pattern: &str,
        that: &str,
        topic: &str,
        template: &str,
        persistence: Persistence,
    ) -> Result<Arc<Category>> {
        let filename = match persistence {
            Persistence::Session => LEARN_FILE,
            Persistence::Persistent => LEARNF_FILE,
        };
        let category =
            self.add_category(Category::new(pattern, that, topic, template, filename))?;
        debug!(path = %category.path_key(), ?persistence, "learned category");
        if persistence == Persistence::Persistent {
            self.pending_learnf
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Arc::clone(&category));
        }
        Ok(category)
    }

    /// Drain categories learned with `<learnf>` since the last call.
    pub fn take_pending_learnf(&self) -> Vec<Arc<Category>> {
        std::mem::take(&mut *self.pending_learnf.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drop every category learned at the given level. Forgetting persistent
    /// ones also discards the unsaved queue and flags the store copies for
    /// deletion, see [`Bot::take_learnf_reset`].
    pub fn forget_learned(&self, persistence: Persistence) -> usize {
        let filename = match persistence {
            Persistence::Session => LEARN_FILE,
            Persistence::Persistent => LEARNF_FILE,
        };
        let removed = self.write_index().retain(|c| c.filename() != filename);
        if persistence == Persistence::Persistent {
            self.pending_learnf
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            self.learnf_reset.store(true, Ordering::Release);
        }
        debug!(removed, ?persistence, "forgot learned categories");
        removed
    }

    /// Whether `<resetlearnf/>` ran since the last call.
    pub fn take_learnf_reset(&self) -> bool {
        self.learnf_reset.swap(false, Ordering::AcqRel)
    }

    /// Resolve the best category and count the activation.
    pub fn find(&self, input: &str, that: &str, topic: &str) -> Option<Match> {
        let found = self.read_index().best_match(input, that, topic, &self.sets);
        match &found {
            Some(m) => {
                m.category.increment_activation();
                if self.config.track_matches {
                    m.category.add_match(input);
                }
                debug!(input, that, topic, matched = %m.category.path_key(), "match");
            }
            None => debug!(input, that, topic, "no match"),
        }
        found
    }

    pub fn exists(&self, pattern: &str, that: &str, topic: &str) -> bool {
        self.read_index().exists(pattern, that, topic)
    }

    pub fn category_count(&self) -> usize {
        self.read_index().category_count()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.read_index().vocabulary_size()
    }

    pub fn stats(&self) -> IndexStats {
        self.read_index().stats()
    }

    pub fn categories(&self) -> Vec<Arc<Category>> {
        self.read_index().categories()
    }

    pub fn memory(&self) -> &RelationalMemory {
        &self.memory
    }

    pub fn set(&self, name: &str) -> Option<&WordSet> {
        self.sets.get(&name.to_uppercase())
    }

    pub fn map(&self, name: &str) -> Option<&dyn MapLookup> {
        self.maps.get(&name.to_lowercase()).map(|m| m.as_ref())
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn default_predicates(&self) -> &Predicates {
        &self.default_predicates
    }

    pub fn is_pronoun(&self, name: &str) -> bool {
        self.pronouns.contains(&name.to_lowercase())
    }

    pub fn normalizer(&self) -> &dyn Normalizer {
        self.normalizer.as_ref()
    }

    pub fn service(&self) -> Option<&dyn ExternalService> {
        self.service.as_deref()
    }

    pub fn extension_for(&self, tag: &str) -> Option<&dyn TagExtension> {
        self.extensions
            .iter()
            .find(|e| e.accepts(tag))
            .map(|e| e.as_ref())
    }
}

pub struct BotBuilder {
    name: String,
    config: BotConfig,
    sets: HashMap<String, WordSet>,
    maps: HashMap<String, Arc<dyn MapLookup>>,
    properties: HashMap<String, String>,
    default_predicates: Predicates,
    pronouns: HashSet<String>,
    normalizer: Arc<dyn Normalizer>,
    service: Option<Arc<dyn ExternalService>>,
    extensions: Vec<Arc<dyn TagExtension>>,
}

impl BotBuilder {
    fn new(name: &str) -> Self {
        let mut builder = Self {
            name: name.to_string(),
            config: BotConfig::default(),
            sets: HashMap::new(),
            maps: HashMap::new(),
            properties: HashMap::new(),
            default_predicates: Predicates::new(),
            pronouns: HashSet::new(),
            normalizer: Arc::new(SubstitutionNormalizer::default()),
            service: None,
            extensions: Vec::new(),
        };
        builder.properties.insert("name".into(), name.to_string());
        builder = builder
            .set(WordSet::number())
            .map("successor", Arc::new(Successor))
            .map("predecessor", Arc::new(Predecessor));
        builder
    }

    pub fn config(mut self, config: BotConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set(mut self, set: WordSet) -> Self {
        self.sets.insert(set.name().to_uppercase(), set);
        self
    }

    pub fn map(mut self, name: &str, map: Arc<dyn MapLookup>) -> Self {
        self.maps.insert(name.to_lowercase(), map);
        self
    }

    pub fn property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    pub fn default_predicate(mut self, name: &str, value: &str) -> Self {
        self.default_predicates.set(name, value);
        self
    }

    /// Predicate whose `<set>` reports its name rather than its value.
    pub fn pronoun(mut self, name: &str) -> Self {
        self.pronouns.insert(name.trim().to_lowercase());
        self
    }

    pub fn normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn service(mut self, service: Arc<dyn ExternalService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn extension(mut self, extension: Arc<dyn TagExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn build(self) -> Bot {
        Bot {
            index: RwLock::new(PatternIndex::new(self.config.enable_shortcuts)),
            memory: RelationalMemory::new(self.config.max_tuples),
            name: self.name,
            config: self.config,
            sets: self.sets,
            maps: self.maps,
            properties: self.properties,
            default_predicates: self.default_predicates,
            pronouns: self.pronouns,
            normalizer: self.normalizer,
            service: self.service,
            extensions: self.extensions,
            pending_learnf: Mutex::new(Vec::new()),
            learnf_reset: AtomicBool::new(false),
        }
    }
}
