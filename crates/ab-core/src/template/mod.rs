//! Templates are parsed once into a typed tree; evaluation never touches the
//! markup again.

pub mod ast;

pub use ast::{
    Condition, ConditionItem, HistoryKind, Interval, LearnCategory, LearnPart, Markup, Node,
    Param, Persistence, QueryClause, Select, Shape, Sraix, TripleArgs,
};

use crate::error::Result;
use crate::index::StarKind;
use crate::markup::{Content, Element, parse_fragment};

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self> {
        let contents = parse_fragment(text)?;
        Ok(Self {
            nodes: convert_all(&contents),
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

fn convert_all(contents: &[Content]) -> Vec<Node> {
    contents.iter().map(convert_content).collect()
}

fn convert_content(content: &Content) -> Node {
    match content {
        Content::Text(t) => Node::Text(t.clone()),
        Content::Element(e) => convert(e),
    }
}

/// Attribute first, then the last same-named child element.
fn param(el: &Element, name: &str) -> Option<Param> {
    if let Some(value) = el.attr(name) {
        return Some(Param::Literal(value.to_string()));
    }
    el.last_child(name)
        .map(|child| Param::Nodes(convert_all(&child.children)))
}

/// Children that are not parameter elements.
fn body(el: &Element, params: &[&str]) -> Vec<Node> {
    el.children
        .iter()
        .filter(|c| match c {
            Content::Element(e) => !params.contains(&e.name.as_str()),
            Content::Text(_) => true,
        })
        .map(convert_content)
        .collect()
}

fn body_or_star(el: &Element) -> Vec<Node> {
    if el.children.is_empty() {
        vec![Node::Star {
            kind: StarKind::Input,
            index: None,
        }]
    } else {
        convert_all(&el.children)
    }
}

fn triple_args(el: &Element) -> TripleArgs {
    TripleArgs {
        subj: param(el, "subj"),
        pred: param(el, "pred"),
        obj: param(el, "obj"),
    }
}

fn convert(el: &Element) -> Node {
    let shape = |s: Shape| Node::Shape(s, convert_all(&el.children));
    match el.name.as_str() {
        "srai" => Node::Srai(convert_all(&el.children)),
        "sr" => Node::Sr,
        "random" => Node::Random(
            el.child_elements()
                .filter(|c| c.name == "li")
                .map(|li| convert_all(&li.children))
                .collect(),
        ),
        "condition" => Node::Condition(Box::new(condition(el))),
        "set" => Node::Set {
            name: param(el, "name"),
            var: param(el, "var"),
            body: body(el, &["name", "var"]),
        },
        "get" => Node::Get {
            name: param(el, "name"),
            var: param(el, "var"),
            tuple: param(el, "tuple"),
        },
        "bot" => Node::Bot(param(el, "name")),
        "map" => Node::Map {
            name: param(el, "name"),
            body: body(el, &["name"]),
        },
        "sraix" => Node::Sraix(Box::new(Sraix {
            host: param(el, "host"),
            botid: param(el, "botid"),
            hint: param(el, "hint"),
            service: param(el, "service"),
            fallback: param(el, "default"),
            body: body(el, &["host", "botid", "hint", "service", "default"]),
        })),
        "star" => star(el, StarKind::Input),
        "thatstar" => star(el, StarKind::That),
        "topicstar" => star(el, StarKind::Topic),
        "that" => Node::That(param(el, "index")),
        "input" => Node::History(HistoryKind::Input, param(el, "index")),
        "request" => Node::History(HistoryKind::Request, param(el, "index")),
        "response" => Node::History(HistoryKind::Response, param(el, "index")),
        "think" => Node::Think(convert_all(&el.children)),
        "eval" => Node::Eval(convert_all(&el.children)),
        "uppercase" => shape(Shape::Uppercase),
        "lowercase" => shape(Shape::Lowercase),
        "formal" => shape(Shape::Formal),
        "sentence" => shape(Shape::Sentence),
        "explode" => shape(Shape::Explode),
        "normalize" => shape(Shape::Normalize),
        "denormalize" => shape(Shape::Denormalize),
        "first" => shape(Shape::First),
        "rest" => shape(Shape::Rest),
        "person" => Node::Shape(Shape::Person, body_or_star(el)),
        "person2" => Node::Shape(Shape::Person2, body_or_star(el)),
        "gender" => Node::Shape(Shape::Gender, body_or_star(el)),
        "date" => Node::Date(param(el, "format").or_else(|| param(el, "jformat"))),
        "interval" => Node::Interval(Box::new(Interval {
            style: param(el, "style"),
            format: param(el, "format").or_else(|| param(el, "jformat")),
            from: param(el, "from"),
            to: param(el, "to"),
        })),
        "id" => Node::Id,
        "size" => Node::Size,
        "vocabulary" => Node::Vocabulary,
        "program" => Node::Program,
        "learn" => Node::Learn(Persistence::Session, learn_categories(el, None)),
        "learnf" => Node::Learn(Persistence::Persistent, learn_categories(el, None)),
        "resetlearn" => Node::ResetLearn(Persistence::Session),
        "resetlearnf" => Node::ResetLearn(Persistence::Persistent),
        "addtriple" => Node::AddTriple(Box::new(triple_args(el))),
        "deletetriple" => Node::DeleteTriple(Box::new(triple_args(el))),
        "select" => Node::Select(Box::new(Select {
            vars: param(el, "vars"),
            clauses: el
                .child_elements()
                .filter(|c| c.name == "q" || c.name == "notq")
                .map(|c| QueryClause {
                    args: triple_args(c),
                    affirmative: c.name == "q",
                })
                .collect(),
        })),
        "uniq" => Node::Uniq(Box::new(triple_args(el))),
        "loop" => Node::Loop,
        _ => Node::Markup(Box::new(Markup {
            name: el.name.clone(),
            attributes: el.attributes.clone(),
            children: el
                .children
                .iter()
                .map(|c| {
                    let name = match c {
                        Content::Element(e) => Some(e.name.clone()),
                        Content::Text(_) => None,
                    };
                    (name, convert_content(c))
                })
                .collect(),
        })),
    }
}

fn star(el: &Element, kind: StarKind) -> Node {
    Node::Star {
        kind,
        index: param(el, "index"),
    }
}

fn condition(el: &Element) -> Condition {
    let items = el
        .child_elements()
        .filter(|c| c.name == "li")
        .map(|li| ConditionItem {
            name: param(li, "name"),
            var: param(li, "var"),
            value: param(li, "value"),
            body: body(li, &["name", "var", "value"]),
        })
        .collect();
    Condition {
        name: param(el, "name"),
        var: param(el, "var"),
        value: param(el, "value"),
        body: body(el, &["name", "var", "value", "li"]),
        items,
    }
}

fn learn_categories(el: &Element, topic: Option<&Element>) -> Vec<LearnCategory> {
    let mut out = Vec::new();
    for child in el.child_elements() {
        match child.name.as_str() {
            "category" => out.push(LearnCategory {
                pattern: child
                    .last_child("pattern")
                    .map(|p| learn_parts(&p.children))
                    .unwrap_or_default(),
                that: child.last_child("that").map(|t| learn_parts(&t.children)),
                topic: child
                    .last_child("topic")
                    .map(|t| learn_parts(&t.children))
                    .or_else(|| topic.map(topic_parts)),
                template: child
                    .last_child("template")
                    .map(|t| learn_parts(&t.children))
                    .unwrap_or_default(),
            }),
            "topic" => out.extend(learn_categories(child, Some(child))),
            _ => {}
        }
    }
    out
}

fn topic_parts(topic: &Element) -> Vec<LearnPart> {
    vec![LearnPart::Text(
        topic.attr("name").unwrap_or("*").to_string(),
    )]
}

fn learn_parts(contents: &[Content]) -> Vec<LearnPart> {
    let mut parts = Vec::new();
    collect_learn_parts(contents, &mut parts);
    parts
}

fn collect_learn_parts(contents: &[Content], parts: &mut Vec<LearnPart>) {
    for content in contents {
        match content {
            Content::Text(t) => parts.push(LearnPart::Text(t.clone())),
            Content::Element(e) if e.name == "eval" => {
                parts.push(LearnPart::Eval(convert_all(&e.children)));
            }
            Content::Element(e) if e.children.is_empty() => {
                parts.push(LearnPart::Tag(e.empty_tag()));
            }
            Content::Element(e) => {
                parts.push(LearnPart::Tag(e.start_tag()));
                collect_learn_parts(&e.children, parts);
                parts.push(LearnPart::Tag(e.end_tag()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<Node> {
        Template::parse(text).unwrap().nodes().to_vec()
    }

    #[test]
    fn test_attribute_beats_child_param() {
        let nodes = parse(r#"<get name="a"><name>b</name></get>"#);
        match &nodes[0] {
            Node::Get { name, .. } => assert_eq!(name, &Some(Param::Literal("a".into()))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_param_children_excluded_from_body() {
        let nodes = parse("<set><name>x</name>value</set>");
        match &nodes[0] {
            Node::Set { name, body, .. } => {
                assert_eq!(name, &Some(Param::Nodes(vec![Node::Text("x".into())])));
                assert_eq!(body, &vec![Node::Text("value".into())]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_condition_items() {
        let nodes = parse(
            r#"<condition name="mood"><li value="a">A</li><li><value>b</value>B</li><li>other</li></condition>"#,
        );
        let Node::Condition(c) = &nodes[0] else {
            panic!("expected condition");
        };
        assert_eq!(c.items.len(), 3);
        assert!(c.items[2].value.is_none());
        assert_eq!(c.items[1].body, vec![Node::Text("B".into())]);
    }

    #[test]
    fn test_person_without_content_uses_star() {
        let nodes = parse("<person/>");
        assert_eq!(
            nodes[0],
            Node::Shape(
                Shape::Person,
                vec![Node::Star {
                    kind: StarKind::Input,
                    index: None
                }]
            )
        );
    }

    #[test]
    fn test_resetlearn_tags() {
        assert_eq!(
            parse("<resetlearn/><resetlearnf/>"),
            vec![
                Node::ResetLearn(Persistence::Session),
                Node::ResetLearn(Persistence::Persistent),
            ]
        );
    }

    #[test]
    fn test_unknown_tag_is_markup() {
        let nodes = parse(r#"<b class="x">hi <star/></b>"#);
        let Node::Markup(m) = &nodes[0] else {
            panic!("expected markup");
        };
        assert_eq!(m.name, "b");
        assert_eq!(m.children.len(), 2);
        assert_eq!(m.children[1].0.as_deref(), Some("star"));
    }

    #[test]
    fn test_learn_keeps_raw_markup_with_eval_holes() {
        let nodes = parse(
            "<learn><category><pattern>WHO IS <eval><star/></eval></pattern>\
             <template>A <b>friend</b></template></category></learn>",
        );
        let Node::Learn(Persistence::Session, cats) = &nodes[0] else {
            panic!("expected learn");
        };
        assert_eq!(cats.len(), 1);
        assert!(matches!(cats[0].pattern[1], LearnPart::Eval(_)));
        assert_eq!(
            cats[0].template,
            vec![
                LearnPart::Text("A ".into()),
                LearnPart::Tag("<b>".into()),
                LearnPart::Text("friend".into()),
                LearnPart::Tag("</b>".into()),
            ]
        );
    }

    #[test]
    fn test_select_clauses() {
        let nodes = parse(
            "<select><vars>?x</vars><q><subj>?x</subj><pred>likes</pred><obj>pizza</obj></q>\
             <notq><subj>?x</subj><pred>is</pred><obj>robot</obj></notq></select>",
        );
        let Node::Select(s) = &nodes[0] else {
            panic!("expected select");
        };
        assert_eq!(s.clauses.len(), 2);
        assert!(s.clauses[0].affirmative);
        assert!(!s.clauses[1].affirmative);
    }

    #[test]
    fn test_malformed_template_is_error() {
        assert!(Template::parse("<think><set name=\"x\">a</think>").is_err());
    }
}
