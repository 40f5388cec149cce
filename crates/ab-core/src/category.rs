use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{CoreError, Result};
use crate::markup::escape;
use crate::path::{PathToken, category_path, normalize_path_text, tokenize_path};
use crate::template::Template;

/// One stimulus-response rule.
///
/// Paths are fixed at construction. Only the activation counter and the
/// optional matched-input set change afterwards.
#[derive(Debug)]
pub struct Category {
    pattern: String,
    that: String,
    topic: String,
    template_text: String,
    template: std::result::Result<Template, String>,
    filename: String,
    activation: AtomicU32,
    matches: Mutex<Option<BTreeSet<String>>>,
}

impl Category {
    pub fn new(pattern: &str, that: &str, topic: &str, template: &str, filename: &str) -> Self {
        let template_text = template.replace("& ", " and ");
        let parsed = Template::parse(&template_text).map_err(|e| e.to_string());
        Self {
            pattern: normalize_path_text(pattern),
            that: normalize_path_text(that),
            topic: normalize_path_text(topic),
            template_text,
            template: parsed,
            filename: filename.trim().to_string(),
            activation: AtomicU32::new(0),
            matches: Mutex::new(None),
        }
    }

    pub fn with_activation(self, count: u32) -> Self {
        self.activation.store(count, Ordering::Relaxed);
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn that(&self) -> &str {
        &self.that
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn template_text(&self) -> &str {
        &self.template_text
    }

    pub fn template(&self) -> std::result::Result<&Template, &str> {
        self.template.as_ref().map_err(String::as_str)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// `PATTERN <THAT> THAT <TOPIC> TOPIC`
    pub fn path_key(&self) -> String {
        format!("{} <THAT> {} <TOPIC> {}", self.pattern, self.that, self.topic)
    }

    pub fn path(&self) -> Vec<PathToken> {
        category_path(&self.pattern, &self.that, &self.topic)
    }

    pub fn activation(&self) -> u32 {
        self.activation.load(Ordering::Relaxed)
    }

    pub fn increment_activation(&self) {
        // saturating: the counter never wraps back to zero
        let _ = self
            .activation
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1));
    }

    pub fn add_match(&self, input: &str) {
        let mut guard = self
            .matches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .get_or_insert_with(BTreeSet::new)
            .insert(input.to_string());
    }

    pub fn matches(&self) -> Vec<String> {
        let guard = self
            .matches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .as_ref()
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Checks run before a category enters the index.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(CoreError::InvalidCategory {
                path: self.path_key(),
                reason,
            })
        };
        for (label, text) in [
            ("pattern", &self.pattern),
            ("that", &self.that),
            ("topic", &self.topic),
        ] {
            let tokens = tokenize_path(text);
            if tokens.is_empty() {
                return fail(format!("empty {label}"));
            }
            for token in &tokens {
                match token {
                    PathToken::That | PathToken::Topic => {
                        return fail(format!("separator inside {label}"));
                    }
                    PathToken::Word(w) if w.contains('<') || w.contains('>') => {
                        return fail(format!("stray markup in {label}: {w}"));
                    }
                    _ => {}
                }
            }
        }
        if let Err(reason) = &self.template {
            return fail(format!("template: {reason}"));
        }
        if !self.filename.ends_with(".aiml") {
            return fail(format!("unsupported provenance '{}'", self.filename));
        }
        Ok(())
    }

    /// Flat interchange record:
    /// `activation,pattern,that,topic,template,filename`.
    pub fn to_record(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.activation(),
            escape_field(&self.pattern),
            escape_field(&self.that),
            escape_field(&self.topic),
            escape_field(&self.template_text),
            escape_field(&self.filename)
        )
    }

    pub fn from_record(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(',').collect();
        let [activation, pattern, that, topic, template, filename] = fields.as_slice() else {
            return Err(CoreError::Record(format!(
                "expected 6 fields, found {}",
                fields.len()
            )));
        };
        let activation = activation
            .trim()
            .parse::<u32>()
            .map_err(|e| CoreError::Record(format!("activation '{activation}': {e}")))?;
        Ok(Category::new(
            &unescape_field(pattern),
            &unescape_field(that),
            &unescape_field(topic),
            &unescape_field(template),
            &unescape_field(filename),
        )
        .with_activation(activation))
    }

    /// Authoring markup for this category.
    pub fn to_aiml(&self) -> String {
        let mut out = String::from("<category><pattern>");
        out.push_str(&authoring_path(&self.pattern));
        out.push_str("</pattern>");
        if self.that != "*" {
            out.push_str("<that>");
            out.push_str(&authoring_path(&self.that));
            out.push_str("</that>");
        }
        out.push_str("<template>");
        out.push_str(&self.template_text);
        out.push_str("</template></category>");
        if self.topic != "*" {
            out = format!("<topic name=\"{}\">{out}</topic>", escape(&self.topic));
        }
        out
    }
}

fn escape_field(text: &str) -> String {
    text.replace("\r\n", "#Newline")
        .replace('\n', "#Newline")
        .replace(',', "#Comma")
}

fn unescape_field(text: &str) -> String {
    text.replace("#Newline", "\n").replace("#Comma", ",")
}

fn authoring_path(text: &str) -> String {
    tokenize_path(text)
        .iter()
        .map(|token| match token {
            PathToken::Set(name) => format!("<set>{}</set>", name.to_lowercase()),
            PathToken::Word(w) => escape(w),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
