//! One conversation with a bot.

use std::sync::{Arc, LazyLock};

use rand::SeedableRng;
use rand::rngs::SmallRng;
use regex::Regex;

use crate::bot::Bot;
use crate::constants::{DEFAULT_THAT, DEFAULT_TOPIC, NULL_INPUT, REPETITION_DETECTED};
use crate::history::History;
use crate::interpreter::Processor;
use crate::predicates::Predicates;

static NEWLINE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").unwrap());

/// Per-client state: histories, predicates and the random source.
/// Sessions share the bot but nothing else, so they need no locking.
pub struct Session {
    pub(crate) bot: Arc<Bot>,
    pub(crate) client_id: String,
    /// One inner history per exchange, holding the bot's reply sentences.
    pub(crate) that_history: History<History<String>>,
    pub(crate) request_history: History<String>,
    pub(crate) response_history: History<String>,
    pub(crate) input_history: History<String>,
    pub(crate) predicates: Predicates,
    pub(crate) rng: SmallRng,
}

impl Session {
    pub fn new(bot: Arc<Bot>, client_id: &str) -> Self {
        Self::with_rng(bot, client_id, SmallRng::from_os_rng())
    }

    /// Deterministic `<random>` choices.
    pub fn with_seed(bot: Arc<Bot>, client_id: &str, seed: u64) -> Self {
        Self::with_rng(bot, client_id, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(bot: Arc<Bot>, client_id: &str, rng: SmallRng) -> Self {
        let capacity = bot.config().max_history;
        let mut predicates = Predicates::new();
        predicates.set("topic", DEFAULT_TOPIC);
        predicates.extend_from(bot.default_predicates());
        Self {
            client_id: client_id.to_string(),
            that_history: History::new(capacity),
            request_history: History::new(capacity),
            response_history: History::new(capacity),
            input_history: History::new(capacity),
            predicates,
            rng,
            bot,
        }
    }

    pub fn bot(&self) -> &Arc<Bot> {
        &self.bot
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn predicates(&self) -> &Predicates {
        &self.predicates
    }

    pub fn predicates_mut(&mut self) -> &mut Predicates {
        &mut self.predicates
    }

    pub fn that_history(&self) -> &History<History<String>> {
        &self.that_history
    }

    pub fn input_history(&self) -> &History<String> {
        &self.input_history
    }

    pub fn request_history(&self) -> &History<String> {
        &self.request_history
    }

    pub fn response_history(&self) -> &History<String> {
        &self.response_history
    }

    /// Answer a possibly multi-sentence request. Each sentence is matched on
    /// its own against the bot's last reply sentence; the replies are joined.
    pub fn respond(&mut self, request: &str) -> String {
        let bot = Arc::clone(&self.bot);
        let normalized = bot.normalizer().normalize(request);
        let mut sentences = bot.normalizer().sentence_split(&normalized);
        if sentences.is_empty() {
            sentences.push(String::new());
        }

        let mut context = History::new(bot.config().max_history);
        let mut response = String::new();
        for sentence in &sentences {
            let reply = self.respond_sentence(sentence, &mut context);
            response.push_str("  ");
            response.push_str(&reply);
        }

        let response = NEWLINE_RUNS.replace_all(&response, "\n").trim().to_string();
        self.request_history.push(request.to_string());
        self.response_history.push(response.clone());
        self.that_history.push(context);
        response
    }

    fn respond_sentence(&mut self, sentence: &str, context: &mut History<String>) -> String {
        let that = self
            .that_history
            .get(0)
            .and_then(|h| h.get(0))
            .cloned()
            .unwrap_or_else(|| DEFAULT_THAT.to_string());
        let topic = self.predicates.get("topic");

        let input = if sentence.trim().is_empty() {
            NULL_INPUT.to_string()
        } else {
            sentence.to_string()
        };
        let repeated = self.is_repetition(&input);
        self.input_history.push(input.clone());
        let input = if repeated {
            REPETITION_DETECTED.to_string()
        } else {
            input
        };

        let reply = Processor::new(self).respond(&input, &that, &topic);

        let bot = Arc::clone(&self.bot);
        let normalized = bot.normalizer().normalize(&reply);
        for sentence in bot.normalizer().sentence_split(&normalized) {
            context.push(sentence);
        }
        if context.is_empty() {
            context.push(DEFAULT_THAT.to_string());
        }
        reply.trim().to_string()
    }

    /// The last `repetition_count` inputs all equal this one.
    fn is_repetition(&self, input: &str) -> bool {
        let count = self.bot.config().repetition_count;
        if count == 0 || input == NULL_INPUT {
            return false;
        }
        let upper = input.to_uppercase();
        (0..count).all(|i| {
            self.input_history
                .get(i)
                .is_some_and(|prev| prev.to_uppercase() == upper)
        })
    }
}
