pub mod bot_dir;
pub mod error;
pub mod schema;
pub mod store;

pub use bot_dir::{BotDir, BotManifest, open_bot};
pub use error::{Result, StoreError};
pub use store::Store;
