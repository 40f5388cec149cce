use std::path::Path;

use rusqlite::{Connection, params};

use ab_core::constants::LEARNF_FILE;
use ab_core::{Bot, Category, LoadReport, Predicates, Triple};

use crate::error::{Result, StoreError};
use crate::schema;

const BOT_NAME_KEY: &str = "bot_name";

/// SQLite persistence for what a running bot learns: categories authored with
/// `<learnf>`, the triple set, and each client's predicates.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Categories ---

    /// Insert or replace the category stored under the same path.
    pub fn save_category(&self, category: &Category) -> Result<()> {
        save_category_on(&self.conn, category)
    }

    pub fn save_categories<'a>(
        &self,
        categories: impl IntoIterator<Item = &'a Category>,
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;
        for category in categories {
            save_category_on(&tx, category)?;
            count += 1;
        }
        tx.commit()?;
        Ok(count)
    }

    pub fn load_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT pattern, that_pattern, topic, template, filename, activation
             FROM categories ORDER BY id",
        )?;
        let rows: Vec<(String, String, String, String, String, i64)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(pattern, that, topic, template, filename, activation)| {
                let activation = u32::try_from(activation).map_err(|_| {
                    StoreError::InvalidData(format!(
                        "activation {activation} out of range for '{pattern}'"
                    ))
                })?;
                Ok(Category::new(&pattern, &that, &topic, &template, &filename)
                    .with_activation(activation))
            })
            .collect()
    }

    /// Drop every category that came from `filename`.
    pub fn delete_categories_from(&self, filename: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM categories WHERE filename = ?1", [filename])?;
        Ok(deleted)
    }

    pub fn category_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // --- Triples ---

    pub fn save_triple(&self, subject: &str, predicate: &str, object: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO triples (subject, predicate, object) VALUES (?1, ?2, ?3)",
            params![subject, predicate, object],
        )?;
        Ok(())
    }

    /// Returns false when no such triple was stored.
    pub fn delete_triple(&self, subject: &str, predicate: &str, object: &str) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM triples WHERE subject = ?1 AND predicate = ?2 AND object = ?3",
            params![subject, predicate, object],
        )?;
        Ok(deleted > 0)
    }

    /// Replace the stored triple set with `triples`.
    pub fn replace_triples(&self, triples: &[Triple]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM triples", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO triples (subject, predicate, object) VALUES (?1, ?2, ?3)",
            )?;
            for triple in triples {
                insert.execute(params![triple.subject, triple.predicate, triple.object])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_triples(&self) -> Result<Vec<(String, String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT subject, predicate, object FROM triples ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    // --- Predicates ---

    /// Replace the stored predicates of one client.
    pub fn save_predicates(&self, client_id: &str, predicates: &Predicates) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM predicates WHERE client_id = ?1", [client_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO predicates (client_id, name, value) VALUES (?1, ?2, ?3)",
            )?;
            for (name, value) in predicates.iter() {
                insert.execute(params![client_id, name, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_predicates(&self, client_id: &str) -> Result<Predicates> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM predicates WHERE client_id = ?1")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([client_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows.into_iter().collect())
    }

    // --- Bot state ---

    /// Load persisted categories and triples into a freshly built bot.
    /// The store remembers the first bot that used it and warns when another
    /// one opens it.
    pub fn restore_into(&self, bot: &Bot) -> Result<LoadReport> {
        match self.get_metadata(BOT_NAME_KEY)? {
            Some(owner) if owner != bot.name() => {
                tracing::warn!(owner, bot = bot.name(), "store belongs to another bot");
            }
            Some(_) => {}
            None => self.set_metadata(BOT_NAME_KEY, bot.name())?,
        }
        let report = bot.add_categories(self.load_categories()?);
        let triples = self.load_triples()?;
        for (s, p, o) in &triples {
            bot.memory().add_triple(s, p, o);
        }
        tracing::info!(
            categories = report.loaded,
            rejected = report.rejected.len(),
            triples = triples.len(),
            "restored persisted state"
        );
        Ok(report)
    }

    /// Write out categories learned with `<learnf>` since the last call and
    /// the current triple set. A `<resetlearnf/>` since the last call drops
    /// the stored ones first.
    pub fn persist_learned(&self, bot: &Bot) -> Result<usize> {
        if bot.take_learnf_reset() {
            let deleted = self.delete_categories_from(LEARNF_FILE)?;
            tracing::debug!(deleted, "cleared stored learnf categories");
        }
        let pending = bot.take_pending_learnf();
        let saved = self.save_categories(pending.iter().map(|c| c.as_ref()))?;
        self.replace_triples(&bot.memory().triples())?;
        if saved > 0 {
            tracing::debug!(saved, "persisted learned categories");
        }
        Ok(saved)
    }
}

fn save_category_on(conn: &Connection, category: &Category) -> Result<()> {
    conn.execute(
        "INSERT INTO categories (pattern, that_pattern, topic, template, filename, activation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (pattern, that_pattern, topic) DO UPDATE SET
             template = excluded.template,
             filename = excluded.filename,
             activation = excluded.activation",
        params![
            category.pattern(),
            category.that(),
            category.topic(),
            category.template_text(),
            category.filename(),
            category.activation(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_core::Persistence;

    fn category(pattern: &str, template: &str) -> Category {
        Category::new(pattern, "*", "*", template, "learnf.aiml")
    }

    #[test]
    fn test_save_and_load_categories() {
        let store = Store::open_in_memory().unwrap();
        let a = category("HELLO", "Hi");
        let b = Category::new("YES", "DO YOU LIKE IT", "FOOD", "Great", "learnf.aiml")
            .with_activation(3);
        assert_eq!(store.save_categories([&a, &b]).unwrap(), 2);

        let loaded = store.load_categories().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].path_key(), "YES <THAT> DO YOU LIKE IT <TOPIC> FOOD");
        assert_eq!(loaded[1].activation(), 3);
        assert_eq!(loaded[0].template_text(), "Hi");
    }

    #[test]
    fn test_save_category_replaces_same_path() {
        let store = Store::open_in_memory().unwrap();
        store.save_category(&category("HELLO", "Hi")).unwrap();
        store.save_category(&category("hello", "Hey")).unwrap();
        let loaded = store.load_categories().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].template_text(), "Hey");
    }

    #[test]
    fn test_delete_categories_from() {
        let store = Store::open_in_memory().unwrap();
        store.save_category(&category("A", "a")).unwrap();
        store
            .save_category(&Category::new("B", "*", "*", "b", "other.aiml"))
            .unwrap();
        assert_eq!(store.delete_categories_from("learnf.aiml").unwrap(), 1);
        assert_eq!(store.category_count().unwrap(), 1);
    }

    #[test]
    fn test_triples() {
        let store = Store::open_in_memory().unwrap();
        store.save_triple("Alice", "likes", "pizza").unwrap();
        store.save_triple("Alice", "likes", "pizza").unwrap();
        store.save_triple("Bob", "likes", "tea").unwrap();
        assert_eq!(store.load_triples().unwrap().len(), 2);
        assert!(store.delete_triple("Bob", "likes", "tea").unwrap());
        assert!(!store.delete_triple("Bob", "likes", "tea").unwrap());
        assert_eq!(
            store.load_triples().unwrap(),
            vec![("Alice".to_string(), "likes".to_string(), "pizza".to_string())]
        );
    }

    #[test]
    fn test_predicates_per_client() {
        let store = Store::open_in_memory().unwrap();
        let mut preds = Predicates::new();
        preds.set("name", "Ada");
        preds.set("topic", "math");
        store.save_predicates("c1", &preds).unwrap();
        preds.set("name", "Grace");
        store.save_predicates("c2", &preds).unwrap();

        assert_eq!(store.load_predicates("c1").unwrap().get("name"), "Ada");
        assert_eq!(store.load_predicates("c2").unwrap().get("name"), "Grace");
        assert!(store.load_predicates("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_metadata() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_metadata("bot_name").unwrap(), None);
        store.set_metadata("bot_name", "ab").unwrap();
        assert_eq!(store.get_metadata("bot_name").unwrap().as_deref(), Some("ab"));
    }

    #[test]
    fn test_persist_and_restore_learned_state() {
        let store = Store::open_in_memory().unwrap();
        let bot = Bot::builder("ab").build();
        bot.learn("COLOR", "*", "*", "blue", Persistence::Persistent)
            .unwrap();
        bot.learn("TEMP", "*", "*", "gone", Persistence::Session)
            .unwrap();
        bot.memory().add_triple("sky", "is", "blue");
        assert_eq!(store.persist_learned(&bot).unwrap(), 1);
        assert_eq!(store.persist_learned(&bot).unwrap(), 0);

        let fresh = Bot::builder("ab").build();
        let report = store.restore_into(&fresh).unwrap();
        assert_eq!(report.loaded, 1);
        assert!(fresh.exists("COLOR", "*", "*"));
        assert!(!fresh.exists("TEMP", "*", "*"));
        assert_eq!(fresh.memory().len(), 1);
    }

    #[test]
    fn test_restore_records_bot_name() {
        let store = Store::open_in_memory().unwrap();
        store.restore_into(&Bot::builder("ab").build()).unwrap();
        store.restore_into(&Bot::builder("other").build()).unwrap();
        assert_eq!(store.get_metadata(BOT_NAME_KEY).unwrap().as_deref(), Some("ab"));
    }

    #[test]
    fn test_resetlearnf_clears_stored_categories() {
        let store = Store::open_in_memory().unwrap();
        let bot = Bot::builder("ab").build();
        bot.learn("COLOR", "*", "*", "blue", Persistence::Persistent)
            .unwrap();
        assert_eq!(store.persist_learned(&bot).unwrap(), 1);
        store
            .save_category(&Category::new("IMPORTED", "*", "*", "kept", "import.aiml"))
            .unwrap();

        bot.learn("SHAPE", "*", "*", "round", Persistence::Persistent)
            .unwrap();
        assert_eq!(bot.forget_learned(Persistence::Persistent), 2);
        assert_eq!(store.persist_learned(&bot).unwrap(), 0);
        assert_eq!(store.category_count().unwrap(), 1);

        let fresh = Bot::builder("ab").build();
        store.restore_into(&fresh).unwrap();
        assert!(!fresh.exists("COLOR", "*", "*"));
        assert!(fresh.exists("IMPORTED", "*", "*"));
    }

    #[test]
    fn test_open_file_db_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ab.db");
        {
            let store = Store::open(&path).unwrap();
            store.save_category(&category("HELLO", "Hi")).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.category_count().unwrap(), 1);
    }
}
