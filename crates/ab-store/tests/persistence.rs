//! A bot loaded from disk learns at runtime; a second process opening the
//! same directory and database sees what was learned.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use ab_core::Session;
use ab_store::{BotDir, Store, open_bot};
use ab_store::bot_dir::parse_aiml;

const AIML: &str = r#"<aiml>
  <category>
    <pattern>REMEMBER * IS *</pattern>
    <template><learnf><category><pattern>WHAT IS <eval><star/></eval></pattern>
      <template><eval><star index="2"/></eval></template></category></learnf>
      <addtriple><subj><star/></subj><pred>is</pred><obj><star index="2"/></obj></addtriple></template>
  </category>
  <category>
    <pattern>MY NAME IS *</pattern>
    <template><set name="name"><star/></set></template>
  </category>
</aiml>"#;

fn bot_dir(root: &Path) -> BotDir {
    fs::create_dir_all(root.join("aiml")).unwrap();
    fs::write(root.join("aiml/memory.aiml"), AIML).unwrap();
    fs::write(root.join("bot.toml"), "name = \"keeper\"\nqa_test_mode = true\n").unwrap();
    BotDir::open(root).unwrap()
}

#[test]
fn learned_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("ab.db");
    let bot_root = dir.path().join("bot");

    {
        let store = Store::open(&db).unwrap();
        let (bot, report) = open_bot(&bot_dir(&bot_root), &store, None).unwrap();
        assert_eq!(report.loaded, 2);
        let mut session = Session::with_seed(Arc::new(bot), "alice", 1);
        assert_eq!(session.respond("remember sky is blue"), "Added");
        assert_eq!(session.respond("my name is Alice"), "Alice");
        assert_eq!(store.persist_learned(session.bot()).unwrap(), 1);
        store
            .save_predicates(session.client_id(), session.predicates())
            .unwrap();
    }

    let store = Store::open(&db).unwrap();
    let (bot, report) = open_bot(&BotDir::open(&bot_root).unwrap(), &store, None).unwrap();
    assert_eq!(report.loaded, 3);
    assert_eq!(bot.memory().len(), 1);

    let mut session = Session::with_seed(Arc::new(bot), "alice", 1);
    session
        .predicates_mut()
        .extend_from(&store.load_predicates("alice").unwrap());
    assert_eq!(session.respond("what is sky"), "blue");
    assert_eq!(session.predicates().get("name"), "Alice");
}

#[test]
fn exported_aiml_parses_back() {
    let dir = tempfile::tempdir().unwrap();
    let (bot, _) = bot_dir(dir.path()).load().unwrap();

    let mut doc = String::from("<aiml>");
    for category in bot.categories() {
        doc.push_str(&category.to_aiml());
    }
    doc.push_str("</aiml>");

    let (reparsed, rejected) = parse_aiml(&doc, "export.aiml").unwrap();
    assert!(rejected.is_empty());
    let mut before: Vec<String> = bot.categories().iter().map(|c| c.path_key()).collect();
    let mut after: Vec<String> = reparsed.iter().map(|c| c.path_key()).collect();
    before.sort();
    after.sort();
    assert_eq!(before, after);
}
