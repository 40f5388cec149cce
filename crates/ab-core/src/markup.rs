//! Owned markup tree for templates and rule files.
//!
//! Built from `quick-xml` events. Entities are unescaped, comments and
//! processing instructions dropped, CDATA kept as text.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Content>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Content::Element(e) => Some(e),
            Content::Text(_) => None,
        })
    }

    /// Last child element with the given name.
    pub fn last_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().filter(|e| e.name == name).last()
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    pub fn start_tag(&self) -> String {
        format!("<{}{}>", self.name, self.attribute_markup())
    }

    pub fn end_tag(&self) -> String {
        format!("</{}>", self.name)
    }

    pub fn empty_tag(&self) -> String {
        format!("<{}{}/>", self.name, self.attribute_markup())
    }

    fn attribute_markup(&self) -> String {
        self.attributes
            .iter()
            .map(|(k, v)| format!(" {k}=\"{}\"", escape(v)))
            .collect()
    }

    /// Serialize the children only.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        write_contents(&self.children, &mut out);
        out
    }

    fn write_markup(&self, out: &mut String) {
        if self.children.is_empty() {
            out.push_str(&self.empty_tag());
        } else {
            out.push_str(&self.start_tag());
            write_contents(&self.children, out);
            out.push_str(&self.end_tag());
        }
    }
}

fn collect_text(contents: &[Content], out: &mut String) {
    for content in contents {
        match content {
            Content::Text(t) => out.push_str(t),
            Content::Element(e) => collect_text(&e.children, out),
        }
    }
}

pub fn write_contents(contents: &[Content], out: &mut String) {
    for content in contents {
        match content {
            Content::Text(t) => out.push_str(&escape(t)),
            Content::Element(e) => e.write_markup(out),
        }
    }
}

pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Parse mixed content: text and elements in any order at the top level.
pub fn parse_fragment(text: &str) -> Result<Vec<Content>> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut top: Vec<Content> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CoreError::Markup(format!("at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                push_content(&mut stack, &mut top, Content::Element(element));
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                let Some(element) = stack.pop() else {
                    return Err(CoreError::Markup(format!("unexpected </{name}>")));
                };
                if element.name != name {
                    return Err(CoreError::Markup(format!(
                        "expected </{}>, found </{name}>",
                        element.name
                    )));
                }
                push_content(&mut stack, &mut top, Content::Element(element));
            }
            Event::Text(t) => {
                let text = match t.unescape() {
                    Ok(s) => s.into_owned(),
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };
                push_text(&mut stack, &mut top, text);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                push_text(&mut stack, &mut top, text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(CoreError::Markup(format!("unclosed <{}>", open.name)));
    }
    Ok(top)
}

/// Parse a document with exactly one root element.
pub fn parse_document(text: &str) -> Result<Element> {
    let mut root = None;
    for content in parse_fragment(text)? {
        match content {
            Content::Element(e) if root.is_none() => root = Some(e),
            Content::Element(e) => {
                return Err(CoreError::Markup(format!(
                    "second root element <{}>",
                    e.name
                )));
            }
            Content::Text(t) if t.trim().is_empty() => {}
            Content::Text(t) => {
                return Err(CoreError::Markup(format!(
                    "text outside root element: {}",
                    t.trim()
                )));
            }
        }
    }
    root.ok_or_else(|| CoreError::Markup("document has no root element".into()))
}

fn open_element(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| CoreError::Markup(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(&attr.value).into_owned()))
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn push_content(stack: &mut [Element], top: &mut Vec<Content>, content: Content) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(content),
        None => top.push(content),
    }
}

fn push_text(stack: &mut [Element], top: &mut Vec<Content>, text: String) {
    if text.is_empty() {
        return;
    }
    let siblings = match stack.last_mut() {
        Some(parent) => &mut parent.children,
        None => top,
    };
    if let Some(Content::Text(prev)) = siblings.last_mut() {
        prev.push_str(&text);
    } else {
        siblings.push(Content::Text(text));
    }
}
