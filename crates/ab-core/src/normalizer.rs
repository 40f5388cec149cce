//! Text normalization collaborator.
//!
//! The engine only sees the [`Normalizer`] trait. [`SubstitutionNormalizer`]
//! is the stock implementation: literal substitution lists, each compiled to
//! one regex and applied in a single left-to-right pass, so a swap such as
//! `I`/`you` never undoes itself.

use std::sync::LazyLock;

use regex::{Captures, Regex, RegexBuilder};
use tracing::warn;

static SENTENCE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?。！？]+").unwrap());

pub trait Normalizer: Send + Sync {
    /// Prepare raw input for matching.
    fn normalize(&self, text: &str) -> String;
    /// Undo `normalize` for display.
    fn denormalize(&self, text: &str) -> String;
    /// First/second person swap.
    fn person(&self, text: &str) -> String;
    /// First/third person swap.
    fn person2(&self, text: &str) -> String;
    fn gender(&self, text: &str) -> String;
    fn sentence_split(&self, text: &str) -> Vec<String>;
}

/// Which list a substitution file feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubstitutionKind {
    Normal,
    Denormal,
    Person,
    Person2,
    Gender,
}

impl SubstitutionKind {
    pub const ALL: [SubstitutionKind; 5] = [
        SubstitutionKind::Normal,
        SubstitutionKind::Denormal,
        SubstitutionKind::Person,
        SubstitutionKind::Person2,
        SubstitutionKind::Gender,
    ];

    pub fn file_stem(self) -> &'static str {
        match self {
            SubstitutionKind::Normal => "normal",
            SubstitutionKind::Denormal => "denormal",
            SubstitutionKind::Person => "person",
            SubstitutionKind::Person2 => "person2",
            SubstitutionKind::Gender => "gender",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubstitutionList {
    /// Replacements in the order of the alternation's capture groups.
    replacements: Vec<String>,
    /// Every pattern escaped into one case-insensitive alternation, longest
    /// first so the longer of two overlapping entries wins.
    matcher: Option<Regex>,
}

impl SubstitutionList {
    pub fn new<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let mut entries: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(a, b)| (a.into(), b.into()))
            .filter(|(a, _)| !a.is_empty())
            .collect();
        if entries.is_empty() {
            return Self::default();
        }
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let alternation = entries
            .iter()
            .map(|(pattern, _)| format!("({})", pattern_regex(pattern)))
            .collect::<Vec<_>>()
            .join("|");
        let matcher = match RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()
        {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(entries = entries.len(), "substitution list not compiled: {e}");
                None
            }
        };
        Self {
            replacements: entries.into_iter().map(|(_, r)| r).collect(),
            matcher,
        }
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Replace every occurrence in one pass over ` text `. Word gaps are
    /// doubled first so a pattern ending in a space leaves one behind for
    /// the next pattern to start on.
    pub fn apply(&self, text: &str) -> String {
        let Some(matcher) = &self.matcher else {
            return collapse(text);
        };
        let spaced = format!(" {} ", collapse(text)).replace(' ', "  ");
        let replaced = matcher.replace_all(&spaced, |caps: &Captures<'_>| {
            caps.iter()
                .skip(1)
                .position(|group| group.is_some())
                .and_then(|i| self.replacements.get(i))
                .map_or_else(|| caps[0].to_string(), Clone::clone)
        });
        collapse(&replaced)
    }
}

/// Escape a literal pattern for doubled-space text: a leading or inner space
/// run takes every gap space, a trailing one takes a single space.
fn pattern_regex(pattern: &str) -> String {
    let body = pattern.trim_end_matches(' ');
    let trailing = body.len() < pattern.len();
    let mut out = String::new();
    for (i, word) in body.split(' ').enumerate() {
        if i > 0 {
            out.push_str(" +");
        }
        out.push_str(&regex::escape(word));
    }
    if trailing {
        out.push(' ');
    }
    out
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn list<const N: usize>(pairs: [(&str, &str); N]) -> SubstitutionList {
    SubstitutionList::new(pairs)
}

#[derive(Debug, Clone)]
pub struct SubstitutionNormalizer {
    normal: SubstitutionList,
    denormal: SubstitutionList,
    person: SubstitutionList,
    person2: SubstitutionList,
    gender: SubstitutionList,
}

impl Default for SubstitutionNormalizer {
    fn default() -> Self {
        Self {
            normal: list([
                (",", " "),
                (";", " "),
                (":", " "),
                ("\"", " "),
                ("(", " "),
                (")", " "),
                ("[", " "),
                ("]", " "),
                (" - ", " "),
            ]),
            denormal: SubstitutionList::default(),
            person: list([
                (" I AM ", " you are "),
                (" YOU ARE ", " I am "),
                (" I WAS ", " you were "),
                (" YOU WERE ", " I was "),
                (" I ", " you "),
                (" ME ", " you "),
                (" MY ", " your "),
                (" MINE ", " yours "),
                (" MYSELF ", " yourself "),
                (" YOU ", " me "),
                (" YOUR ", " my "),
                (" YOURS ", " mine "),
                (" YOURSELF ", " myself "),
            ]),
            person2: list([
                (" I AM ", " he or she is "),
                (" I WAS ", " he or she was "),
                (" I ", " he or she "),
                (" ME ", " him or her "),
                (" MY ", " his or her "),
                (" MINE ", " his or hers "),
                (" HE ", " I "),
                (" SHE ", " I "),
                (" HIM ", " me "),
            ]),
            gender: list([
                (" HE ", " she "),
                (" SHE ", " he "),
                (" HIM ", " her "),
                (" HIS ", " her "),
                (" HER ", " his "),
                (" HIMSELF ", " herself "),
                (" HERSELF ", " himself "),
            ]),
        }
    }
}

impl SubstitutionNormalizer {
    /// Replace one of the stock lists.
    pub fn with_list(mut self, kind: SubstitutionKind, list: SubstitutionList) -> Self {
        *self.list_mut(kind) = list;
        self
    }

    fn list_mut(&mut self, kind: SubstitutionKind) -> &mut SubstitutionList {
        match kind {
            SubstitutionKind::Normal => &mut self.normal,
            SubstitutionKind::Denormal => &mut self.denormal,
            SubstitutionKind::Person => &mut self.person,
            SubstitutionKind::Person2 => &mut self.person2,
            SubstitutionKind::Gender => &mut self.gender,
        }
    }
}

impl Normalizer for SubstitutionNormalizer {
    fn normalize(&self, text: &str) -> String {
        self.normal.apply(text)
    }

    fn denormalize(&self, text: &str) -> String {
        self.denormal.apply(text)
    }

    fn person(&self, text: &str) -> String {
        self.person.apply(text)
    }

    fn person2(&self, text: &str) -> String {
        self.person2.apply(text)
    }

    fn gender(&self, text: &str) -> String {
        self.gender.apply(text)
    }

    fn sentence_split(&self, text: &str) -> Vec<String> {
        SENTENCE_BREAK
            .split(text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation() {
        let n = SubstitutionNormalizer::default();
        assert_eq!(n.normalize("Hello, (world)!"), "Hello world !");
    }

    #[test]
    fn test_sentence_split() {
        let n = SubstitutionNormalizer::default();
        assert_eq!(n.sentence_split("Hi. How are you?? Fine"), vec!["Hi", "How are you", "Fine"]);
        assert!(n.sentence_split("  ...  ").is_empty());
    }

    #[test]
    fn test_person_swap_is_single_pass() {
        let n = SubstitutionNormalizer::default();
        assert_eq!(n.person("I like you"), "you like me");
        assert_eq!(n.person("you are my friend"), "I am your friend");
    }

    #[test]
    fn test_adjacent_patterns_share_a_space() {
        let list = SubstitutionList::new([(" A ", " x "), (" B ", " y ")]);
        assert_eq!(list.apply("a b a"), "x y x");
    }

    #[test]
    fn test_longest_pattern_wins() {
        let list = SubstitutionList::new([(" I ", " you "), (" I AM ", " you are ")]);
        assert_eq!(list.apply("i am here"), "you are here");
    }

    #[test]
    fn test_patterns_are_literal() {
        let list = SubstitutionList::new([(".", " dot "), ("A+B", "sum"), (" (x) ", " y ")]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.apply("a+b.c (X) aab"), "sum dot c y aab");
    }

    #[test]
    fn test_empty_list_only_collapses() {
        let list = SubstitutionList::new(Vec::<(String, String)>::new());
        assert!(list.is_empty());
        assert_eq!(list.apply("  a   b "), "a b");
    }

    #[test]
    fn test_gender() {
        let n = SubstitutionNormalizer::default();
        assert_eq!(n.gender("he gave her his book"), "she gave his her book");
    }

    #[test]
    fn test_replaced_list() {
        let n = SubstitutionNormalizer::default()
            .with_list(SubstitutionKind::Denormal, SubstitutionList::new([(" dot com ", ".com ")]));
        assert_eq!(n.denormalize("example dot com"), "example.com");
    }
}
