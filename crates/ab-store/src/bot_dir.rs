use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;

use ab_core::markup::{Content, Element, parse_document};
use ab_core::{
    Bot, BotBuilder, BotConfig, Category, ExternalService, LoadReport, MapTable,
    SubstitutionKind, SubstitutionList, SubstitutionNormalizer, WordSet,
};

use crate::error::{Result, StoreError};
use crate::store::Store;

static SUBSTITUTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(.*?)","(.*?)""#).unwrap());

/// `bot.toml`: the bot's name, an optional external-service endpoint, and
/// any [`BotConfig`] fields to override.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BotManifest {
    pub name: String,
    pub service_url: Option<String>,
    #[serde(flatten)]
    pub config: BotConfig,
}

impl Default for BotManifest {
    fn default() -> Self {
        Self {
            name: "ab".to_string(),
            service_url: None,
            config: BotConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pure parsing helpers (no I/O, fully unit-testable)
// ---------------------------------------------------------------------------

/// Non-empty lines that are not `#` comments.
fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

pub fn parse_manifest(text: &str) -> Result<BotManifest> {
    Ok(toml::from_str(text)?)
}

/// Pattern-side markup as path text: words verbatim, `<set>` references kept.
fn path_text(el: &Element) -> String {
    let mut out = String::new();
    for child in &el.children {
        match child {
            Content::Text(t) => out.push_str(t),
            Content::Element(e) if e.name == "set" => {
                out.push_str(&format!(" <set>{}</set> ", e.text().trim()));
            }
            Content::Element(e) => out.push_str(&e.text()),
        }
    }
    out
}

fn aiml_category(
    el: &Element,
    topic: Option<&str>,
    filename: &str,
) -> std::result::Result<Category, String> {
    let pattern = el
        .last_child("pattern")
        .ok_or_else(|| "missing <pattern>".to_string())?;
    let template = el
        .last_child("template")
        .ok_or_else(|| "missing <template>".to_string())?;
    let that = el.last_child("that").map(path_text);
    let topic = el
        .last_child("topic")
        .map(path_text)
        .or_else(|| topic.map(str::to_string));
    Ok(Category::new(
        &path_text(pattern),
        that.as_deref().unwrap_or("*"),
        topic.as_deref().unwrap_or("*"),
        &template.inner_markup(),
        filename,
    ))
}

/// Categories of one AIML document. Categories missing a pattern or template
/// are reported in the second list as `(source, reason)`.
pub fn parse_aiml(text: &str, filename: &str) -> Result<(Vec<Category>, Vec<(String, String)>)> {
    let root = parse_document(text)?;
    if root.name != "aiml" {
        return Err(StoreError::InvalidData(format!(
            "{filename}: root element is <{}>, expected <aiml>",
            root.name
        )));
    }

    let mut categories = Vec::new();
    let mut rejected = Vec::new();
    let mut push = |el: &Element, topic: Option<&str>| match aiml_category(el, topic, filename) {
        Ok(category) => categories.push(category),
        Err(reason) => rejected.push((filename.to_string(), reason)),
    };
    for child in root.child_elements() {
        match child.name.as_str() {
            "category" => push(child, None),
            "topic" => {
                let name = child.attr("name").unwrap_or("*");
                for category in child.child_elements().filter(|c| c.name == "category") {
                    push(category, Some(name));
                }
            }
            _ => {}
        }
    }
    Ok((categories, rejected))
}

/// One interchange record per line.
pub fn parse_aimlif(text: &str, source: &str) -> (Vec<Category>, Vec<(String, String)>) {
    let mut categories = Vec::new();
    let mut rejected = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        match Category::from_record(line) {
            Ok(category) => categories.push(category),
            Err(e) => rejected.push((format!("{source}:{}", n + 1), e.to_string())),
        }
    }
    (categories, rejected)
}

/// One phrase per line.
pub fn parse_set(name: &str, text: &str) -> WordSet {
    WordSet::from_phrases(name, content_lines(text))
}

/// `key:value` per line.
pub fn parse_map(text: &str) -> MapTable {
    content_lines(text)
        .filter_map(|l| l.split_once(':'))
        .collect()
}

/// `"pattern","replacement"` per line.
pub fn parse_substitutions(text: &str) -> SubstitutionList {
    SubstitutionList::new(content_lines(text).filter_map(|l| {
        let caps = SUBSTITUTION.captures(l)?;
        Some((caps[1].to_string(), caps[2].to_string()))
    }))
}

/// `name:value` per line; used for properties and default predicates.
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    content_lines(text)
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// `subject:predicate:object` per line.
pub fn parse_triples(text: &str) -> Vec<(String, String, String)> {
    content_lines(text)
        .filter_map(|l| {
            let mut fields = l.split(':').map(str::trim);
            let (s, p, o) = (fields.next()?, fields.next()?, fields.next()?);
            Some((s.to_string(), p.to_string(), o.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// I/O wrappers (thin shells around pure logic)
// ---------------------------------------------------------------------------

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if path.is_file() {
        read(path).map(Some)
    } else {
        Ok(None)
    }
}

/// Files in `dir` with extension `ext`, sorted by name. A missing directory
/// has no files.
fn files_with_ext(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == ext))
        .collect();
    files.sort();
    Ok(files)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A bot's files on disk.
///
/// Layout:
/// ```text
/// <root>/
/// ├── bot.toml
/// ├── aiml/*.aiml
/// ├── aimlif/*.csv
/// ├── sets/<name>.txt
/// ├── maps/<name>.txt
/// └── config/
///     ├── properties.txt  predicates.txt  pronouns.txt  triples.txt
///     └── normal.txt  denormal.txt  person.txt  person2.txt  gender.txt
/// ```
#[derive(Debug, Clone)]
pub struct BotDir {
    root: PathBuf,
    manifest: BotManifest,
}

impl BotDir {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(StoreError::InvalidData(format!(
                "bot directory {} does not exist",
                root.display()
            )));
        }
        let manifest = match read_optional(&root.join("bot.toml"))? {
            Some(text) => parse_manifest(&text)?,
            None => BotManifest::default(),
        };
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &BotManifest {
        &self.manifest
    }

    fn config_file(&self, name: &str) -> PathBuf {
        self.root.join("config").join(name)
    }

    /// A builder carrying everything except categories and triples.
    pub fn builder(&self) -> Result<BotBuilder> {
        let mut builder = Bot::builder(&self.manifest.name).config(self.manifest.config.clone());

        for path in files_with_ext(&self.root.join("sets"), "txt")? {
            let set = parse_set(&stem(&path), &read(&path)?);
            tracing::debug!(set = set.name(), phrases = set.len(), "loaded set");
            builder = builder.set(set);
        }
        for path in files_with_ext(&self.root.join("maps"), "txt")? {
            let name = stem(&path);
            let map = parse_map(&read(&path)?);
            tracing::debug!(map = %name, entries = map.len(), "loaded map");
            builder = builder.map(&name, Arc::new(map));
        }

        let mut normalizer = SubstitutionNormalizer::default();
        for kind in SubstitutionKind::ALL {
            let file = format!("{}.txt", kind.file_stem());
            if let Some(text) = read_optional(&self.config_file(&file))? {
                normalizer = normalizer.with_list(kind, parse_substitutions(&text));
            }
        }
        builder = builder.normalizer(Arc::new(normalizer));

        if let Some(text) = read_optional(&self.config_file("properties.txt"))? {
            for (name, value) in parse_properties(&text) {
                builder = builder.property(&name, &value);
            }
        }
        if let Some(text) = read_optional(&self.config_file("predicates.txt"))? {
            for (name, value) in parse_properties(&text) {
                builder = builder.default_predicate(&name, &value);
            }
        }
        if let Some(text) = read_optional(&self.config_file("pronouns.txt"))? {
            for pronoun in content_lines(&text) {
                builder = builder.pronoun(pronoun);
            }
        }
        Ok(builder)
    }

    /// Load `aiml/*.aiml` then `aimlif/*.csv`. A file that fails to parse is
    /// reported and skipped.
    pub fn load_categories(&self, bot: &Bot) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for path in files_with_ext(&self.root.join("aiml"), "aiml")? {
            let filename = file_name(&path);
            match parse_aiml(&read(&path)?, &filename) {
                Ok((categories, rejected)) => {
                    for (source, reason) in rejected {
                        tracing::warn!("rejected category in {source}: {reason}");
                        report.reject(source, reason);
                    }
                    report.merge(bot.add_categories(categories));
                }
                Err(e) => {
                    tracing::warn!("skipping {filename}: {e}");
                    report.reject(filename, e.to_string());
                }
            }
        }

        for path in files_with_ext(&self.root.join("aimlif"), "csv")? {
            let (categories, rejected) = parse_aimlif(&read(&path)?, &file_name(&path));
            for (source, reason) in rejected {
                tracing::warn!("rejected record {source}: {reason}");
                report.reject(source, reason);
            }
            report.merge(bot.add_categories(categories));
        }

        tracing::info!(
            loaded = report.loaded,
            rejected = report.rejected.len(),
            root = %self.root.display(),
            "loaded categories"
        );
        Ok(report)
    }

    pub fn load_triples(&self, bot: &Bot) -> Result<usize> {
        let Some(text) = read_optional(&self.config_file("triples.txt"))? else {
            return Ok(0);
        };
        let triples = parse_triples(&text);
        for (s, p, o) in &triples {
            bot.memory().add_triple(s, p, o);
        }
        Ok(triples.len())
    }

    /// Build the bot from this directory alone.
    pub fn load(&self) -> Result<(Bot, LoadReport)> {
        let bot = self.builder()?.build();
        let report = self.load_categories(&bot)?;
        self.load_triples(&bot)?;
        Ok((bot, report))
    }
}

/// Build the bot from its directory, then layer on what the store persisted.
pub fn open_bot(
    dir: &BotDir,
    store: &Store,
    service: Option<Arc<dyn ExternalService>>,
) -> Result<(Bot, LoadReport)> {
    let mut builder = dir.builder()?;
    if let Some(service) = service {
        builder = builder.service(service);
    }
    let bot = builder.build();
    let mut report = dir.load_categories(&bot)?;
    dir.load_triples(&bot)?;
    report.merge(store.restore_into(&bot)?);
    Ok((bot, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_core::{MapLookup, Normalizer};

    const AIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<aiml version="2.0">
  <!-- greetings -->
  <category>
    <pattern>HELLO</pattern>
    <template>Hi <b>there</b> &amp; welcome</template>
  </category>
  <category>
    <pattern>I LIKE <set>color</set></pattern>
    <that>WHAT DO YOU LIKE</that>
    <template>Nice.</template>
  </category>
  <topic name="CARS">
    <category>
      <pattern>WHAT'S FAST</pattern>
      <template>A car.</template>
    </category>
  </topic>
  <category>
    <template>no pattern</template>
  </category>
</aiml>"#;

    #[test]
    fn test_parse_aiml() {
        let (cats, rejected) = parse_aiml(AIML, "greet.aiml").unwrap();
        assert_eq!(cats.len(), 3);
        assert_eq!(rejected.len(), 1);

        assert_eq!(cats[0].path_key(), "HELLO <THAT> * <TOPIC> *");
        assert_eq!(cats[0].template_text(), "Hi <b>there</b> &amp; welcome");
        assert_eq!(cats[1].path_key(), "I LIKE <SET>COLOR</SET> <THAT> WHAT DO YOU LIKE <TOPIC> *");
        assert_eq!(cats[2].path_key(), "WHAT'S FAST <THAT> * <TOPIC> CARS");
        assert_eq!(cats[2].filename(), "greet.aiml");
    }

    #[test]
    fn test_parse_aiml_wrong_root() {
        assert!(parse_aiml("<html><body/></html>", "x.aiml").is_err());
        assert!(parse_aiml("<aiml><category>", "x.aiml").is_err());
    }

    #[test]
    fn test_parse_aimlif() {
        let text = "0,HELLO,*,*,Hi#Comma there,a.aiml\n\n# comment\nnot a record\n2,BYE,*,*,Bye,a.aiml\n";
        let (cats, rejected) = parse_aimlif(text, "a.csv");
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].template_text(), "Hi, there");
        assert_eq!(cats[1].activation(), 2);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, "a.csv:4");
    }

    #[test]
    fn test_parse_set_and_map() {
        let set = parse_set("color", "red\n# no\n\nnavy blue\n");
        assert_eq!(set.len(), 2);
        assert_eq!(set.max_length(), 2);

        let map = parse_map("france:Paris\nbroken line\nitaly:Rome\n");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("FRANCE").as_deref(), Some("Paris"));
    }

    #[test]
    fn test_parse_substitutions() {
        let list = parse_substitutions("\" dont \",\" do not \"\n# \" x \",\" y \"\nbad\n");
        assert_eq!(list.len(), 1);
        assert_eq!(list.apply("I dont know"), "I do not know");
    }

    #[test]
    fn test_parse_properties_and_triples() {
        let props = parse_properties("name:Alice\nmaster: Ada \n:empty\nnocolon\n");
        assert_eq!(
            props,
            vec![
                ("name".to_string(), "Alice".to_string()),
                ("master".to_string(), "Ada".to_string())
            ]
        );
        let triples = parse_triples("Alice:likes:pizza\nBob:likes\n");
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn test_manifest_overrides_config() {
        let manifest = parse_manifest(
            "name = \"alice\"\nservice_url = \"http://localhost:9000\"\nmax_loops = 5\n",
        )
        .unwrap();
        assert_eq!(manifest.name, "alice");
        assert_eq!(manifest.config.max_loops, 5);
        assert_eq!(manifest.config.max_recursion_count, BotConfig::default().max_recursion_count);
        assert_eq!(parse_manifest("").unwrap(), BotManifest::default());
        assert!(parse_manifest("max_loops = \"many\"").is_err());
    }

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_load_bot_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "bot.toml", "name = \"alice\"\nqa_test_mode = true\n");
        write(root, "aiml/greet.aiml", AIML);
        write(root, "aiml/broken.aiml", "<aiml><category>");
        write(root, "aimlif/extra.csv", "0,BYE,*,*,Goodbye,extra.aiml\n");
        write(root, "sets/color.txt", "red\ngreen\n");
        write(root, "maps/capital.txt", "france:Paris\n");
        write(root, "config/properties.txt", "age:7\n");
        write(root, "config/predicates.txt", "mood:calm\n");
        write(root, "config/pronouns.txt", "he\nshe\n");
        write(root, "config/triples.txt", "Alice:likes:pizza\n");
        write(root, "config/normal.txt", "\"wanna\",\"want to\"\n");

        let bot_dir = BotDir::open(root).unwrap();
        let (bot, report) = bot_dir.load().unwrap();
        assert_eq!(bot.name(), "alice");
        assert!(bot.config().qa_test_mode);
        assert_eq!(report.loaded, 4);
        assert_eq!(report.rejected.len(), 2);
        assert!(bot.set("color").is_some_and(|s| s.contains("green")));
        assert_eq!(bot.map("capital").and_then(|m| m.get("france")).as_deref(), Some("Paris"));
        assert_eq!(bot.property("age"), Some("7"));
        assert_eq!(bot.default_predicates().get("mood"), "calm");
        assert!(bot.is_pronoun("she"));
        assert_eq!(bot.memory().len(), 1);
        assert_eq!(bot.normalizer().normalize("I wanna go"), "I want to go");
    }

    #[test]
    fn test_open_missing_dir() {
        assert!(BotDir::open(Path::new("/nonexistent/bot/dir")).is_err());
    }

    #[test]
    fn test_open_bot_restores_store() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "aiml/a.aiml", "<aiml><category><pattern>HI</pattern><template>Hello</template></category></aiml>");
        let store = Store::open_in_memory().unwrap();
        store
            .save_category(&Category::new("LEARNED", "*", "*", "yes", "learnf.aiml"))
            .unwrap();
        store.save_triple("sky", "is", "blue").unwrap();

        let (bot, report) = open_bot(&BotDir::open(dir.path()).unwrap(), &store, None).unwrap();
        assert_eq!(report.loaded, 2);
        assert!(bot.exists("LEARNED", "*", "*"));
        assert_eq!(bot.memory().len(), 1);
    }
}
