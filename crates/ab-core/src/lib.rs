//! AIML inference engine.
//!
//! A [`Bot`] holds the category index, word-sets, maps and relational memory;
//! a [`Session`] holds one client's conversation state and turns requests
//! into responses. This crate does no I/O: loading bot files, persistence and
//! network services are supplied by the caller.

pub mod bot;
pub mod calendar;
pub mod category;
pub mod config;
pub mod constants;
pub mod error;
pub mod extension;
pub mod history;
pub mod index;
mod interpreter;
pub mod markup;
pub mod normalizer;
pub mod path;
pub mod predicates;
pub mod service;
pub mod session;
pub mod sets;
pub mod template;
pub mod triples;

pub use bot::{Bot, BotBuilder, LoadReport};
pub use category::Category;
pub use config::BotConfig;
pub use error::{CoreError, Result};
pub use extension::{ExtensionCall, TagExtension};
pub use index::{IndexStats, Match, StarBindings, StarKind};
pub use normalizer::{Normalizer, SubstitutionKind, SubstitutionList, SubstitutionNormalizer};
pub use predicates::Predicates;
pub use service::{ExternalService, ServiceRequest};
pub use session::Session;
pub use sets::{MapLookup, MapTable, WordSet};
pub use template::{Persistence, Template};
pub use triples::{Clause, RelationalMemory, Triple};
