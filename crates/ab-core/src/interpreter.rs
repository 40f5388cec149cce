//! Template evaluation.
//!
//! A [`Processor`] lives for one top-level sentence. It owns the local
//! variables and the self-match counter, both shared by every `<srai>` the
//! sentence triggers.

use std::sync::Arc;

use chrono::Local;
use rand::Rng;
use tracing::{debug, warn};

use crate::bot::Bot;
use crate::calendar::{self, DEFAULT_DATE_FORMAT, IntervalStyle};
use crate::constants::{
    DEFAULT_GET, DEFAULT_LIST_ITEM, DEFAULT_MAP, DEFAULT_PROPERTY, LEARN_RESET, LEARNF_RESET,
    LOOP_MARKER, NULL_INPUT, PROGRAM_NAME_VERSION, SRAIX_FAILED, TEMPLATE_FAILED,
    TOO_MUCH_LOOPING, TOO_MUCH_RECURSION, TRIPLE_ADDED, TRIPLE_DELETED, UNKNOWN_HISTORY_ITEM,
};
use crate::extension::ExtensionCall;
use crate::index::{StarBindings, StarKind};
use crate::markup::escape;
use crate::predicates::Predicates;
use crate::service::ServiceRequest;
use crate::session::Session;
use crate::template::{
    Condition, HistoryKind, Interval, LearnCategory, LearnPart, Markup, Node, Param, Persistence,
    Select, Shape, Sraix, TripleArgs,
};
use crate::triples::{Clause, is_variable};

/// Where evaluation currently stands: the matched input and context plus the
/// captures of the category being evaluated.
struct Frame {
    depth: usize,
    that: String,
    stars: StarBindings,
}

pub(crate) struct Processor<'s> {
    bot: Arc<Bot>,
    session: &'s mut Session,
    vars: Predicates,
    srai_count: usize,
}

impl<'s> Processor<'s> {
    pub(crate) fn new(session: &'s mut Session) -> Self {
        Self {
            bot: Arc::clone(&session.bot),
            session,
            vars: Predicates::new(),
            srai_count: 0,
        }
    }

    /// Match one sentence and evaluate the winning template.
    pub(crate) fn respond(&mut self, input: &str, that: &str, topic: &str) -> String {
        let input = if input.trim().is_empty() {
            NULL_INPUT
        } else {
            input
        };
        self.srai_count = 0;
        let Some(found) = self.bot.find(input, that, topic) else {
            return self.bot.config().default_response.clone();
        };
        let template = match found.category.template() {
            Ok(template) => template,
            Err(reason) => {
                warn!(path = %found.category.path_key(), "template failed: {reason}");
                return TEMPLATE_FAILED.to_string();
            }
        };
        let frame = Frame {
            depth: 0,
            that: that.to_string(),
            stars: found.stars.clone(),
        };
        self.eval_all(template.nodes(), &frame)
    }

    fn eval_all(&mut self, nodes: &[Node], frame: &Frame) -> String {
        let mut out = String::new();
        for node in nodes {
            out.push_str(&self.eval(node, frame));
        }
        out
    }

    fn eval_param(&mut self, param: Option<&Param>, frame: &Frame) -> Option<String> {
        match param? {
            Param::Literal(value) => Some(value.trim().to_string()),
            Param::Nodes(nodes) => Some(self.eval_all(nodes, frame).trim().to_string()),
        }
    }

    fn eval(&mut self, node: &Node, frame: &Frame) -> String {
        match node {
            Node::Text(text) => text.clone(),
            Node::Srai(body) => {
                let input = self.eval_all(body, frame);
                self.srai(&input, frame)
            }
            Node::Sr => {
                let star = frame.stars.input.first().cloned().unwrap_or_default();
                self.srai(&star, frame)
            }
            Node::Random(options) => self.random(options, frame),
            Node::Condition(condition) => self.condition(condition, frame),
            Node::Set { name, var, body } => {
                self.set(name.as_ref(), var.as_ref(), body, frame)
            }
            Node::Get { name, var, tuple } => {
                self.get(name.as_ref(), var.as_ref(), tuple.as_ref(), frame)
            }
            Node::Bot(name) => {
                let name = self.eval_param(name.as_ref(), frame).unwrap_or_default();
                self.bot
                    .property(&name)
                    .unwrap_or(DEFAULT_PROPERTY)
                    .to_string()
            }
            Node::Map { name, body } => self.map(name.as_ref(), body, frame),
            Node::Sraix(sraix) => self.sraix(sraix, frame),
            Node::Star { kind, index } => self.star(*kind, index.as_ref(), frame),
            Node::That(index) => self.that(index.as_ref(), frame),
            Node::History(kind, index) => self.history(*kind, index.as_ref(), frame),
            Node::Think(body) => {
                self.eval_all(body, frame);
                String::new()
            }
            Node::Eval(body) => self.eval_all(body, frame),
            Node::Shape(shape, body) => {
                let text = self.eval_all(body, frame);
                self.shape(*shape, &text)
            }
            Node::Date(format) => {
                let format = self.eval_param(format.as_ref(), frame);
                calendar::format_now(format.as_deref())
                    .unwrap_or_else(|| DEFAULT_GET.to_string())
            }
            Node::Interval(interval) => self.interval(interval, frame),
            Node::Id => self.session.client_id.clone(),
            Node::Size => self.bot.category_count().to_string(),
            Node::Vocabulary => self.bot.vocabulary_size().to_string(),
            Node::Program => PROGRAM_NAME_VERSION.to_string(),
            Node::Learn(persistence, categories) => {
                for category in categories {
                    self.learn(*persistence, category, frame);
                }
                String::new()
            }
            Node::ResetLearn(persistence) => {
                self.bot.forget_learned(*persistence);
                match persistence {
                    Persistence::Session => LEARN_RESET,
                    Persistence::Persistent => LEARNF_RESET,
                }
                .to_string()
            }
            Node::AddTriple(args) => {
                let (s, p, o) = self.triple_fields(args, frame, ["", "", ""]);
                if self.bot.memory().add_triple(&s, &p, &o) {
                    TRIPLE_ADDED.to_string()
                } else {
                    DEFAULT_LIST_ITEM.to_string()
                }
            }
            Node::DeleteTriple(args) => {
                let (s, p, o) = self.triple_fields(args, frame, ["", "", ""]);
                if self.bot.memory().delete_triple(&s, &p, &o) {
                    TRIPLE_DELETED.to_string()
                } else {
                    DEFAULT_LIST_ITEM.to_string()
                }
            }
            Node::Select(select) => self.select(select, frame),
            Node::Uniq(args) => self.uniq(args, frame),
            Node::Loop => LOOP_MARKER.to_string(),
            Node::Markup(markup) => self.markup(markup, frame),
        }
    }

    /// Match `input` again and evaluate the result one level deeper.
    fn srai(&mut self, input: &str, frame: &Frame) -> String {
        self.srai_count += 1;
        let config = self.bot.config();
        if self.srai_count > config.max_recursion_count || frame.depth > config.max_recursion_depth
        {
            warn!(
                count = self.srai_count,
                depth = frame.depth,
                "recursion bound reached"
            );
            return TOO_MUCH_RECURSION.to_string();
        }

        let input = input.replace(['\r', '\n'], " ");
        let input = self.bot.normalizer().normalize(&input);
        let input = input.trim();
        let input = if input.is_empty() { NULL_INPUT } else { input };
        let topic = self.session.predicates.get("topic");

        let Some(found) = self.bot.find(input, &frame.that, &topic) else {
            return self.bot.config().default_response.clone();
        };
        let template = match found.category.template() {
            Ok(template) => template,
            Err(reason) => {
                warn!(path = %found.category.path_key(), "template failed: {reason}");
                return TEMPLATE_FAILED.to_string();
            }
        };
        debug!(input, depth = frame.depth + 1, "srai");
        let next = Frame {
            depth: frame.depth + 1,
            that: frame.that.clone(),
            stars: found.stars.clone(),
        };
        self.eval_all(template.nodes(), &next).trim().to_string()
    }

    fn random(&mut self, options: &[Vec<Node>], frame: &Frame) -> String {
        if options.is_empty() {
            return String::new();
        }
        let choice = if self.bot.config().qa_test_mode {
            0
        } else {
            self.session.rng.random_range(0..options.len())
        };
        self.eval_all(&options[choice], frame)
    }

    fn condition(&mut self, condition: &Condition, frame: &Frame) -> String {
        let mut out = String::new();
        for _ in 0..self.bot.config().max_loops {
            let result = self.condition_once(condition, frame);
            if result.contains(TOO_MUCH_RECURSION) {
                return result;
            }
            if !result.contains(LOOP_MARKER) {
                out.push_str(&result);
                return out;
            }
            out.push_str(&result.replace(LOOP_MARKER, ""));
        }
        warn!("condition exceeded {} iterations", self.bot.config().max_loops);
        TOO_MUCH_LOOPING.to_string()
    }

    fn condition_once(&mut self, condition: &Condition, frame: &Frame) -> String {
        let name = self.eval_param(condition.name.as_ref(), frame);
        let var = self.eval_param(condition.var.as_ref(), frame);

        if condition.items.is_empty() {
            let value = self.eval_param(condition.value.as_ref(), frame);
            return match value {
                Some(value) if self.holds(name.as_deref(), var.as_deref(), &value) => {
                    self.eval_all(&condition.body, frame)
                }
                _ => String::new(),
            };
        }

        for item in &condition.items {
            let item_name = match &name {
                Some(name) => Some(name.clone()),
                None => self.eval_param(item.name.as_ref(), frame),
            };
            let item_var = match &var {
                Some(var) => Some(var.clone()),
                None => self.eval_param(item.var.as_ref(), frame),
            };
            match self.eval_param(item.value.as_ref(), frame) {
                None => return self.eval_all(&item.body, frame),
                Some(value) => {
                    if self.holds(item_name.as_deref(), item_var.as_deref(), &value) {
                        return self.eval_all(&item.body, frame);
                    }
                }
            }
        }
        String::new()
    }

    /// True when the named predicate or the local variable has `value`.
    /// `*` holds for any defined value.
    fn holds(&self, name: Option<&str>, var: Option<&str>, value: &str) -> bool {
        let value = value.trim();
        let check = |actual: Option<&str>| {
            if value == "*" {
                return actual.is_some_and(|a| a != DEFAULT_GET);
            }
            actual
                .unwrap_or(DEFAULT_GET)
                .trim()
                .eq_ignore_ascii_case(value)
        };
        name.is_some_and(|name| check(self.session.predicates.get_opt(name)))
            || var.is_some_and(|var| check(self.vars.get_opt(var)))
    }

    fn set(
        &mut self,
        name: Option<&Param>,
        var: Option<&Param>,
        body: &[Node],
        frame: &Frame,
    ) -> String {
        let name = self.eval_param(name, frame);
        let var = self.eval_param(var, frame);
        let value = self.eval_all(body, frame).trim().to_string();
        if let Some(name) = name {
            self.session.predicates.set(&name, &value);
            if self.bot.is_pronoun(&name) {
                return name;
            }
        } else if let Some(var) = var {
            self.vars.set(&var, &value);
        }
        value
    }

    fn get(
        &mut self,
        name: Option<&Param>,
        var: Option<&Param>,
        tuple: Option<&Param>,
        frame: &Frame,
    ) -> String {
        let name = self.eval_param(name, frame);
        let var = self.eval_param(var, frame);
        let tuple = self.eval_param(tuple, frame);
        match (name, var, tuple) {
            (Some(name), _, _) => self.session.predicates.get(&name),
            (None, Some(var), Some(tuple)) => self
                .bot
                .memory()
                .tuple_value(&tuple, &var)
                .unwrap_or_else(|| DEFAULT_GET.to_string()),
            (None, Some(var), None) => self.vars.get(&var),
            _ => DEFAULT_GET.to_string(),
        }
    }

    fn map(&mut self, name: Option<&Param>, body: &[Node], frame: &Frame) -> String {
        let name = self.eval_param(name, frame);
        let key = self.eval_all(body, frame).trim().to_string();
        match name {
            None => format!("<map>{key}</map>"),
            Some(name) => self
                .bot
                .map(&name)
                .and_then(|m| m.get(&key))
                .unwrap_or_else(|| DEFAULT_MAP.to_string()),
        }
    }

    fn sraix(&mut self, sraix: &Sraix, frame: &Frame) -> String {
        let request = ServiceRequest {
            query: self.eval_all(&sraix.body, frame).trim().to_string(),
            hint: self.eval_param(sraix.hint.as_ref(), frame),
            host: self.eval_param(sraix.host.as_ref(), frame),
            botid: self.eval_param(sraix.botid.as_ref(), frame),
            service: self.eval_param(sraix.service.as_ref(), frame),
            default: self.eval_param(sraix.fallback.as_ref(), frame),
            timeout: self.bot.config().service_timeout(),
        };

        let outcome = match self.bot.service() {
            Some(service) if self.bot.config().network_enabled => service.call(&request),
            _ => Err(crate::error::CoreError::Service(
                "external services are disabled".into(),
            )),
        };
        match outcome {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => self.sraix_fallback(request.default, frame),
            Err(e) => {
                debug!(query = %request.query, "sraix failed: {e}");
                self.sraix_fallback(request.default, frame)
            }
        }
    }

    fn sraix_fallback(&mut self, default: Option<String>, frame: &Frame) -> String {
        match default {
            Some(default) => default,
            None => self.srai(SRAIX_FAILED, frame),
        }
    }

    /// 1-based index into one capture list.
    fn star(&mut self, kind: StarKind, index: Option<&Param>, frame: &Frame) -> String {
        let index = match self.eval_param(index, frame) {
            Some(text) => text.parse::<usize>().unwrap_or(0),
            None => 1,
        };
        index
            .checked_sub(1)
            .and_then(|i| frame.stars.get(kind).get(i))
            .cloned()
            .unwrap_or_default()
    }

    /// `index="M,N"`: sentence N of the bot's M-th previous reply.
    fn that(&mut self, index: Option<&Param>, frame: &Frame) -> String {
        let (exchange, sentence) = match self.eval_param(index, frame) {
            Some(text) => {
                let mut parts = text.split(',').map(|p| p.trim().parse::<usize>().ok());
                let exchange = parts.next().flatten().unwrap_or(1);
                let sentence = parts.next().flatten().unwrap_or(1);
                (exchange, sentence)
            }
            None => (1, 1),
        };
        exchange
            .checked_sub(1)
            .and_then(|m| self.session.that_history.get(m))
            .and_then(|replies| sentence.checked_sub(1).and_then(|n| replies.get(n)))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_HISTORY_ITEM.to_string())
    }

    fn history(&mut self, kind: HistoryKind, index: Option<&Param>, frame: &Frame) -> String {
        let index = self
            .eval_param(index, frame)
            .and_then(|text| text.parse::<usize>().ok())
            .unwrap_or(1);
        let history = match kind {
            HistoryKind::Input => &self.session.input_history,
            HistoryKind::Request => &self.session.request_history,
            HistoryKind::Response => &self.session.response_history,
        };
        index
            .checked_sub(1)
            .and_then(|i| history.get(i))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_HISTORY_ITEM.to_string())
    }

    fn shape(&self, shape: Shape, text: &str) -> String {
        let normalizer = self.bot.normalizer();
        match shape {
            Shape::Uppercase => text.to_uppercase(),
            Shape::Lowercase => text.to_lowercase(),
            Shape::Formal => text
                .to_lowercase()
                .split(' ')
                .map(capitalize)
                .collect::<Vec<_>>()
                .join(" "),
            Shape::Sentence => capitalize(text.trim_start()),
            Shape::Explode => text
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(String::from)
                .collect::<Vec<_>>()
                .join(" "),
            Shape::Normalize => normalizer.normalize(text),
            Shape::Denormalize => normalizer.denormalize(text),
            Shape::First => text
                .split_whitespace()
                .next()
                .unwrap_or(DEFAULT_LIST_ITEM)
                .to_string(),
            Shape::Rest => {
                let normalized = normalizer.normalize(text);
                let rest: Vec<&str> = normalized.split_whitespace().skip(1).collect();
                if rest.is_empty() {
                    DEFAULT_LIST_ITEM.to_string()
                } else {
                    rest.join(" ")
                }
            }
            Shape::Person => normalizer.person(text),
            Shape::Person2 => normalizer.person2(text),
            Shape::Gender => normalizer.gender(text),
        }
    }

    fn interval(&mut self, interval: &Interval, frame: &Frame) -> String {
        let style = self.eval_param(interval.style.as_ref(), frame);
        let format = self
            .eval_param(interval.format.as_ref(), frame)
            .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
        let from = self.eval_param(interval.from.as_ref(), frame);
        let to = self.eval_param(interval.to.as_ref(), frame);
        let Some(style) = style
            .as_deref()
            .map_or(Some(IntervalStyle::Years), IntervalStyle::parse)
        else {
            return DEFAULT_GET.to_string();
        };
        calendar::interval(
            style,
            &format,
            from.as_deref(),
            to.as_deref(),
            Local::now().naive_local(),
        )
        .map(|n| n.to_string())
        .unwrap_or_else(|| DEFAULT_GET.to_string())
    }

    fn learn(&mut self, persistence: Persistence, category: &LearnCategory, frame: &Frame) {
        let pattern = self.render_learn_path(&category.pattern, frame);
        let that = match &category.that {
            Some(parts) => self.render_learn_path(parts, frame),
            None => "*".to_string(),
        };
        let topic = match &category.topic {
            Some(parts) => self.render_learn_path(parts, frame),
            None => "*".to_string(),
        };
        let template = self.render_learn_template(&category.template, frame);
        if let Err(e) = self.bot.learn(&pattern, &that, &topic, &template, persistence) {
            warn!(pattern, "learn failed: {e}");
        }
    }

    fn render_learn_path(&mut self, parts: &[LearnPart], frame: &Frame) -> String {
        let mut out = String::new();
        for part in parts {
            match part {
                LearnPart::Text(text) | LearnPart::Tag(text) => out.push_str(text),
                LearnPart::Eval(nodes) => {
                    let value = self.eval_all(nodes, frame);
                    out.push_str(self.bot.normalizer().normalize(&value).trim());
                }
            }
        }
        out
    }

    /// Learned templates are stored as markup, so evaluated text is escaped.
    fn render_learn_template(&mut self, parts: &[LearnPart], frame: &Frame) -> String {
        let mut out = String::new();
        for part in parts {
            match part {
                LearnPart::Text(text) => out.push_str(&escape(text)),
                LearnPart::Tag(tag) => out.push_str(tag),
                LearnPart::Eval(nodes) => {
                    let value = self.eval_all(nodes, frame);
                    out.push_str(&escape(&value));
                }
            }
        }
        out
    }

    /// Evaluate a triple's fields, substituting `defaults` for missing ones.
    fn triple_fields(
        &mut self,
        args: &TripleArgs,
        frame: &Frame,
        defaults: [&str; 3],
    ) -> (String, String, String) {
        let [s, p, o] = defaults;
        (
            self.eval_param(args.subj.as_ref(), frame)
                .unwrap_or_else(|| s.to_string()),
            self.eval_param(args.pred.as_ref(), frame)
                .unwrap_or_else(|| p.to_string()),
            self.eval_param(args.obj.as_ref(), frame)
                .unwrap_or_else(|| o.to_string()),
        )
    }

    fn select(&mut self, select: &Select, frame: &Frame) -> String {
        let visible: Vec<String> = self
            .eval_param(select.vars.as_ref(), frame)
            .map(|vars| vars.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let mut clauses = Vec::with_capacity(select.clauses.len());
        for clause in &select.clauses {
            let (s, p, o) = self.triple_fields(&clause.args, frame, QUERY_DEFAULTS);
            clauses.push(if clause.affirmative {
                Clause::new(&s, &p, &o)
            } else {
                Clause::negated(&s, &p, &o)
            });
        }
        let tuples = self.bot.memory().select(&visible, &clauses);
        if tuples.is_empty() {
            DEFAULT_LIST_ITEM.to_string()
        } else {
            tuples.join(" ")
        }
    }

    /// Single-clause select returning the first value of its last variable,
    /// the field being asked about.
    fn uniq(&mut self, args: &TripleArgs, frame: &Frame) -> String {
        let (s, p, o) = self.triple_fields(args, frame, QUERY_DEFAULTS);
        let clause = Clause::new(&s, &p, &o);
        let Some(variable) = [&s, &p, &o].into_iter().rfind(|f| is_variable(f)).cloned() else {
            return DEFAULT_GET.to_string();
        };
        let memory = self.bot.memory();
        memory
            .select(std::slice::from_ref(&variable), &[clause])
            .first()
            .and_then(|tuple| memory.tuple_value(tuple, &variable))
            .unwrap_or_else(|| DEFAULT_GET.to_string())
    }

    fn markup(&mut self, markup: &Markup, frame: &Frame) -> String {
        let children: Vec<(Option<String>, String)> = markup
            .children
            .iter()
            .map(|(name, node)| (name.clone(), self.eval(node, frame)))
            .collect();
        let content: String = children.iter().map(|(_, text)| text.as_str()).collect();

        if let Some(extension) = self.bot.extension_for(&markup.name) {
            return extension.process(&ExtensionCall {
                tag: &markup.name,
                attributes: &markup.attributes,
                content: &content,
                children: &children,
            });
        }

        let mut tag = format!("<{}", markup.name);
        for (key, value) in &markup.attributes {
            tag.push_str(&format!(" {key}=\"{}\"", escape(value)));
        }
        if content.is_empty() {
            tag.push_str("/>");
        } else {
            tag.push('>');
            tag.push_str(&content);
            tag.push_str(&format!("</{}>", markup.name));
        }
        tag
    }
}

const QUERY_DEFAULTS: [&str; 3] = ["?subject", "?predicate", "?object"];

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
