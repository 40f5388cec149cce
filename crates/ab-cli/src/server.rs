use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use ab_core::{Bot, Persistence, Session};
use ab_store::Store;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

type SharedSession = Arc<std::sync::Mutex<Session>>;

#[derive(Clone)]
pub struct AbServer {
    state: Arc<ServerState>,
    tool_router: ToolRouter<Self>,
}

struct ServerState {
    bot: Arc<Bot>,
    store: std::sync::Mutex<Store>,
    /// One session per client id, created on first contact.
    sessions: Mutex<HashMap<String, SharedSession>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ChatRequest {
    /// Conversation id. A fresh one is issued when omitted.
    client: Option<String>,
    /// What the user said
    text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LearnRequest {
    /// Input pattern, e.g. "WHAT IS *"
    pattern: String,
    /// Pattern matched against the bot's previous sentence (default "*")
    that: Option<String>,
    /// Topic pattern (default "*")
    topic: Option<String>,
    /// Template markup evaluated when the category matches
    template: String,
    /// Keep the category across restarts
    persist: Option<bool>,
}

fn internal(e: impl std::fmt::Display) -> McpError {
    McpError::internal_error(e.to_string(), None)
}

fn json_result(value: &serde_json::Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )])
}

impl AbServer {
    pub fn new(bot: Bot, store: Store) -> Self {
        Self {
            state: Arc::new(ServerState {
                bot: Arc::new(bot),
                store: std::sync::Mutex::new(store),
                sessions: Mutex::new(HashMap::new()),
            }),
            tool_router: Self::tool_router(),
        }
    }

    /// The client's session, restoring saved predicates when it is new.
    async fn session(&self, client: &str) -> Result<SharedSession, McpError> {
        let mut sessions = self.state.sessions.lock().await;
        if let Some(session) = sessions.get(client) {
            return Ok(Arc::clone(session));
        }
        let mut session = Session::new(Arc::clone(&self.state.bot), client);
        let saved = self
            .state
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .load_predicates(client)
            .map_err(internal)?;
        session.predicates_mut().extend_from(&saved);
        tracing::debug!(client, restored = saved.len(), "opened session");
        let session = Arc::new(std::sync::Mutex::new(session));
        sessions.insert(client.to_string(), Arc::clone(&session));
        Ok(session)
    }
}

#[tool_router]
impl AbServer {
    #[tool(
        description = "Send one user turn to the bot and get its reply. Pass the same client id on every turn of a conversation so the bot keeps its predicates and that-context; omit it to start a new conversation and reuse the returned id."
    )]
    async fn bot_chat(
        &self,
        Parameters(req): Parameters<ChatRequest>,
    ) -> Result<CallToolResult, McpError> {
        let client = req.client.unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = self.session(&client).await?;
        let state = Arc::clone(&self.state);
        let text = req.text;

        let reply = tokio::task::spawn_blocking(move || -> ab_store::Result<String> {
            let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
            let reply = session.respond(&text);
            let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
            store.persist_learned(session.bot())?;
            store.save_predicates(session.client_id(), session.predicates())?;
            Ok(reply)
        })
        .await
        .map_err(internal)?
        .map_err(internal)?;

        Ok(json_result(&serde_json::json!({
            "client": client,
            "response": reply,
        })))
    }

    #[tool(
        description = "Teach the bot a new category. With persist=true it survives restarts; otherwise it lasts until the server exits."
    )]
    async fn bot_learn(
        &self,
        Parameters(req): Parameters<LearnRequest>,
    ) -> Result<CallToolResult, McpError> {
        let persistent = req.persist.unwrap_or(false);
        let persistence = if persistent {
            Persistence::Persistent
        } else {
            Persistence::Session
        };
        let bot = &self.state.bot;
        let category = bot
            .learn(
                &req.pattern,
                req.that.as_deref().unwrap_or("*"),
                req.topic.as_deref().unwrap_or("*"),
                &req.template,
                persistence,
            )
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        if persistent {
            self.state
                .store
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .persist_learned(bot)
                .map_err(internal)?;
        }

        Ok(json_result(&serde_json::json!({
            "learned": category.path_key(),
            "persistent": persistent,
            "categories": bot.category_count(),
        })))
    }

    #[tool(
        description = "Bot statistics: category count, vocabulary, pattern-graph shape, triple count and open sessions."
    )]
    async fn bot_stats(&self) -> Result<CallToolResult, McpError> {
        let bot = &self.state.bot;
        let stats = bot.stats();
        let sessions = self.state.sessions.lock().await.len();
        let stored = self
            .state
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .category_count()
            .map_err(internal)?;

        Ok(json_result(&serde_json::json!({
            "name": bot.name(),
            "categories": stats.categories,
            "stored_categories": stored,
            "vocabulary": stats.vocabulary,
            "nodes": stats.nodes,
            "shortcuts": stats.shortcuts,
            "singletons": stats.singletons,
            "max_branching": stats.max_branching,
            "mean_branching": stats.mean_branching,
            "triples": bot.memory().len(),
            "sessions": sessions,
        })))
    }
}

#[tool_handler]
impl ServerHandler for AbServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "A rule-based chatbot. Call bot_chat with the user's text and relay the response.\n\
                 Keep one client id per conversation: the bot remembers names and context per client.\n\
                 Use bot_learn to add a category (pattern, optional that/topic, template markup).\n\
                 bot_stats reports the size of the rule graph."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_core::BotConfig;

    fn make_server() -> AbServer {
        let bot = Bot::builder("tester")
            .config(BotConfig {
                qa_test_mode: true,
                ..BotConfig::default()
            })
            .build();
        bot.learn(
            "HELLO",
            "*",
            "*",
            "Hi there.",
            Persistence::Session,
        )
        .unwrap();
        bot.learn(
            "MY NAME IS *",
            "*",
            "*",
            "<set name=\"name\"><star/></set>",
            Persistence::Session,
        )
        .unwrap();
        bot.learn(
            "WHO AM I",
            "*",
            "*",
            "<get name=\"name\"/>",
            Persistence::Session,
        )
        .unwrap();
        AbServer::new(bot, Store::open_in_memory().unwrap())
    }

    fn text_from_result(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn parse_result(result: &CallToolResult) -> serde_json::Value {
        let text = text_from_result(result);
        serde_json::from_str(&text).expect("handler should return valid JSON")
    }

    async fn chat(server: &AbServer, client: Option<&str>, text: &str) -> serde_json::Value {
        let result = server
            .bot_chat(Parameters(ChatRequest {
                client: client.map(str::to_string),
                text: text.to_string(),
            }))
            .await
            .unwrap();
        parse_result(&result)
    }

    #[tokio::test]
    async fn test_bot_stats() {
        let server = make_server();
        let json = parse_result(&server.bot_stats().await.unwrap());
        assert_eq!(json["name"], "tester");
        assert_eq!(json["categories"], 3);
        assert_eq!(json["stored_categories"], 0);
        assert_eq!(json["sessions"], 0);
    }

    #[tokio::test]
    async fn test_bot_chat_issues_client_id() {
        let server = make_server();
        let json = chat(&server, None, "hello").await;
        assert_eq!(json["response"], "Hi there.");
        let client = json["client"].as_str().unwrap();
        assert!(Uuid::parse_str(client).is_ok());
    }

    #[tokio::test]
    async fn test_sessions_are_per_client() {
        let server = make_server();
        chat(&server, Some("alice"), "my name is Alice").await;
        chat(&server, Some("bob"), "my name is Bob").await;

        assert_eq!(chat(&server, Some("alice"), "who am i").await["response"], "Alice");
        assert_eq!(chat(&server, Some("bob"), "who am i").await["response"], "Bob");

        let stats = parse_result(&server.bot_stats().await.unwrap());
        assert_eq!(stats["sessions"], 2);
    }

    #[tokio::test]
    async fn test_predicates_saved_per_client() {
        let server = make_server();
        chat(&server, Some("carol"), "my name is Carol").await;
        let saved = server
            .state
            .store
            .lock()
            .unwrap()
            .load_predicates("carol")
            .unwrap();
        assert_eq!(saved.get("name"), "Carol");
    }

    #[tokio::test]
    async fn test_bot_learn_then_chat() {
        let server = make_server();
        let result = server
            .bot_learn(Parameters(LearnRequest {
                pattern: "PING".to_string(),
                that: None,
                topic: None,
                template: "pong".to_string(),
                persist: Some(true),
            }))
            .await
            .unwrap();
        let json = parse_result(&result);
        assert_eq!(json["persistent"], true);
        assert_eq!(json["categories"], 4);

        assert_eq!(chat(&server, Some("dave"), "ping").await["response"], "pong");
        let stats = parse_result(&server.bot_stats().await.unwrap());
        assert_eq!(stats["stored_categories"], 1);
    }

    #[tokio::test]
    async fn test_bot_learn_rejects_bad_template() {
        let server = make_server();
        let result = server
            .bot_learn(Parameters(LearnRequest {
                pattern: "BROKEN".to_string(),
                that: None,
                topic: None,
                template: "<think>unclosed".to_string(),
                persist: None,
            }))
            .await;
        assert!(result.is_err());
    }
}
