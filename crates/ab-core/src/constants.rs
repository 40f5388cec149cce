/// Reply when no category matches an input.
pub const DEFAULT_RESPONSE: &str = "I have no answer for that.";

/// Returned in place of a self-match once either recursion bound is hit.
pub const TOO_MUCH_RECURSION: &str = "Too much recursion in AIML";

/// Returned by a condition that keeps requesting another iteration.
pub const TOO_MUCH_LOOPING: &str = "Too much looping in condition";

/// Returned when a category's template could not be parsed.
pub const TEMPLATE_FAILED: &str = "Template failed.";

/// Value of an unset predicate or local variable.
pub const DEFAULT_GET: &str = "unknown";

/// Value of an unset bot property.
pub const DEFAULT_PROPERTY: &str = "unknown";

/// Value of a missing map key.
pub const DEFAULT_MAP: &str = "unknown";

/// Value of a history slot that has not been filled yet.
pub const UNKNOWN_HISTORY_ITEM: &str = "unknown";

/// "that" used before the bot has said anything.
pub const DEFAULT_THAT: &str = "unknown";

/// Topic of a fresh session.
pub const DEFAULT_TOPIC: &str = "unknown";

/// First/rest of an empty list, and the empty result of a relational select.
pub const DEFAULT_LIST_ITEM: &str = "NIL";

/// Input submitted in place of an empty sentence.
pub const NULL_INPUT: &str = "NORESP";

/// External-service failure marker; templates may match on it.
pub const SRAIX_FAILED: &str = "SRAIXFAILED";

/// Input submitted in place of a sentence the client keeps repeating.
pub const REPETITION_DETECTED: &str = "REPETITIONDETECTED";

/// Marker emitted by `<loop/>` inside a condition branch.
pub const LOOP_MARKER: &str = "<loop/>";

/// Provenance of categories learned for the running process only.
pub const LEARN_FILE: &str = "learn.aiml";

/// Provenance of categories learned with `<learnf>` and persisted.
pub const LEARNF_FILE: &str = "learnf.aiml";

/// Reply of `<resetlearn/>`.
pub const LEARN_RESET: &str = "Deleted Learn Categories";

/// Reply of `<resetlearnf/>`.
pub const LEARNF_RESET: &str = "Deleted Learnf Categories";

/// Result of a successful `<addtriple>`.
pub const TRIPLE_ADDED: &str = "Added";

/// Result of a successful `<deletetriple>`.
pub const TRIPLE_DELETED: &str = "Deleted";

/// Path separator between the input and "that" segments.
pub const THAT_SEPARATOR: &str = "<THAT>";

/// Path separator between the "that" and topic segments.
pub const TOPIC_SEPARATOR: &str = "<TOPIC>";

/// Name and version reported by `<program/>`.
pub const PROGRAM_NAME_VERSION: &str = concat!("ab ", env!("CARGO_PKG_VERSION"));
