//! Tokenization of pattern paths.
//!
//! A category is stored under the combined path
//! `pattern <THAT> that <TOPIC> topic`. Authored patterns may reference a
//! word-set as `<set>name</set>`; those references become single tokens so a
//! set never spans a path position.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::constants::{THAT_SEPARATOR, TOPIC_SEPARATOR};

static SET_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<set>\s*([^<>\s]+)\s*(?:</set>)?").unwrap()
});
static NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\r\n|\n\r|\r|\n)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathToken {
    Word(String),
    Set(String),
    Underscore,
    Star,
    That,
    Topic,
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathToken::Word(w) => f.write_str(w),
            PathToken::Set(name) => write!(f, "<SET>{name}</SET>"),
            PathToken::Underscore => f.write_str("_"),
            PathToken::Star => f.write_str("*"),
            PathToken::That => f.write_str(THAT_SEPARATOR),
            PathToken::Topic => f.write_str(TOPIC_SEPARATOR),
        }
    }
}

/// Split a pattern, that, or topic expression into path tokens.
/// Literal words are upper-cased; set names are upper-cased too.
pub fn tokenize_path(text: &str) -> Vec<PathToken> {
    let text = SET_REF.replace_all(text, |caps: &regex::Captures<'_>| {
        format!(" <SET>{}</SET> ", caps[1].to_uppercase())
    });
    text.split_whitespace().map(classify).collect()
}

fn classify(raw: &str) -> PathToken {
    match raw {
        "*" => PathToken::Star,
        "_" => PathToken::Underscore,
        _ if raw.eq_ignore_ascii_case(THAT_SEPARATOR) => PathToken::That,
        _ if raw.eq_ignore_ascii_case(TOPIC_SEPARATOR) => PathToken::Topic,
        _ => match raw
            .strip_prefix("<SET>")
            .and_then(|rest| rest.strip_suffix("</SET>"))
        {
            Some(name) => PathToken::Set(name.to_string()),
            None => PathToken::Word(raw.to_uppercase()),
        },
    }
}

/// The combined path a category is stored under.
pub fn category_path(pattern: &str, that: &str, topic: &str) -> Vec<PathToken> {
    let mut path = tokenize_path(pattern);
    path.push(PathToken::That);
    path.extend(tokenize_path(that));
    path.push(PathToken::Topic);
    path.extend(tokenize_path(topic));
    path
}

/// Render tokens back into path text; `tokenize_path` reproduces them.
pub fn render_path(tokens: &[PathToken]) -> String {
    tokens
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trim, collapse whitespace, and upper-case a path expression, defaulting to
/// `*` when nothing is left.
pub fn normalize_path_text(text: &str) -> String {
    let joined = NEWLINES
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        "*".to_string()
    } else {
        joined.to_uppercase()
    }
}

/// Input text as matchable words, case preserved.
pub fn input_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_are_uppercased() {
        assert_eq!(
            tokenize_path("hello there"),
            vec![PathToken::Word("HELLO".into()), PathToken::Word("THERE".into())]
        );
    }

    #[test]
    fn test_wildcards_and_separators() {
        let tokens = tokenize_path("* _ <THAT> <topic>");
        assert_eq!(
            tokens,
            vec![
                PathToken::Star,
                PathToken::Underscore,
                PathToken::That,
                PathToken::Topic
            ]
        );
    }

    #[test]
    fn test_set_reference_forms() {
        let expected = vec![
            PathToken::Word("I".into()),
            PathToken::Word("LIKE".into()),
            PathToken::Set("COLOR".into()),
        ];
        assert_eq!(tokenize_path("I LIKE <set>color</set>"), expected);
        assert_eq!(tokenize_path("I LIKE <SET> color </SET>"), expected);
        assert_eq!(tokenize_path("I LIKE <SET>COLOR"), expected);
    }

    #[test]
    fn test_render_then_tokenize_is_stable() {
        let path = category_path("MY <set>color</set> IS *", "_", "*");
        assert_eq!(tokenize_path(&render_path(&path)), path);
    }

    #[test]
    fn test_normalize_path_text_defaults_to_star() {
        assert_eq!(normalize_path_text("  \n "), "*");
        assert_eq!(normalize_path_text(" my\nname  is * "), "MY NAME IS *");
    }

    #[test]
    fn test_input_words_keep_case() {
        assert_eq!(input_words(" my name  is Bob "), vec!["my", "name", "is", "Bob"]);
    }
}
