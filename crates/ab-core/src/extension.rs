/// Everything an extension sees of one unrecognized tag.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionCall<'a> {
    pub tag: &'a str,
    pub attributes: &'a [(String, String)],
    /// Concatenated evaluated content.
    pub content: &'a str,
    /// Each child's evaluated text with its tag name, `None` for text.
    pub children: &'a [(Option<String>, String)],
}

/// Handler for tags outside the built-in vocabulary.
pub trait TagExtension: Send + Sync {
    fn accepts(&self, tag: &str) -> bool;
    fn process(&self, call: &ExtensionCall<'_>) -> String;
}
