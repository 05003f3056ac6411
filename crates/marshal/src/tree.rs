//! Owned XML element tree.
//!
//! The tree is the hand-off point between the event pipeline and the binding
//! deserializer, and doubles as the node type callers can marshal into or
//! unmarshal from.

use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::XmlError;
use crate::events::{EventSource, ReaderSource, WhitespaceFilter, local_name};

/// A node of an element's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An XML element with its attributes and content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    /// Qualified element name.
    pub name: String,
    /// Attributes in document order, values unescaped.
    pub attributes: Vec<(String, String)>,
    /// Child elements and text, in document order.
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds an attribute, builder style.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Adds a child element, builder style.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Adds text content, builder style.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(&text.into());
        self
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// Value of the attribute with the given qualified name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Child elements, skipping text.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|child| child.local_name() == name)
    }

    /// Whether the element has at least one child element.
    pub fn has_child_elements(&self) -> bool {
        self.child_elements().next().is_some()
    }

    /// Concatenated text content of this element (not of its descendants).
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            if let XmlNode::Text(chunk) = node {
                text.push_str(chunk);
            }
        }
        text
    }

    /// Appends a child element.
    pub fn push_element(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Appends text, merging with a preceding text node.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(XmlNode::Text(existing)) => existing.push_str(text),
            _ => self.children.push(XmlNode::Text(text.to_string())),
        }
    }

    /// Parses a document into its root element, dropping indentation.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut events = WhitespaceFilter::wrap(ReaderSource::from_slice(xml.as_bytes()), false);
        Self::read_from(&mut events)
    }

    /// Builds the root element of the document read from `source`.
    ///
    /// Prolog content (declaration, comments, processing instructions,
    /// DOCTYPE) is skipped. Entity references are resolved; unknown entities
    /// are rejected.
    pub fn read_from<S: EventSource>(source: &mut S) -> Result<Self, XmlError> {
        let mut stack: Vec<XmlElement> = Vec::new();
        loop {
            match source.next_event()? {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_element(element),
                        None => return finish_root(source, element),
                    }
                }
                Event::End(_) => {
                    // End names are checked by the reader
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::UnexpectedContent("closing tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_element(element),
                        None => return finish_root(source, element),
                    }
                }
                Event::Text(text) => {
                    let text = std::str::from_utf8(&text)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(text),
                        None if text.trim().is_empty() => {}
                        None => return Err(XmlError::UnexpectedContent(text.to_string())),
                    }
                }
                Event::CData(data) => {
                    let data = std::str::from_utf8(&data)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(data),
                        None => return Err(XmlError::UnexpectedContent(data.to_string())),
                    }
                }
                Event::GeneralRef(reference) => {
                    let name = std::str::from_utf8(&reference)?;
                    let resolved = resolve_entity(name)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(&resolved),
                        None => return Err(XmlError::UnexpectedContent(format!("&{};", name))),
                    }
                }
                Event::Eof => {
                    return Err(match stack.last() {
                        Some(open) => XmlError::UnexpectedEof(open.name.clone()),
                        None => XmlError::EmptyDocument,
                    });
                }
                Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
            }
        }
    }

    /// Writes the element through a quick-xml writer.
    pub fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        for node in &self.children {
            match node {
                XmlNode::Element(child) => child.write_to(writer)?,
                XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }

    /// Serializes the element, indented by `indent` spaces (0 for compact output).
    pub fn to_xml_string(&self, indent: usize) -> Result<String, XmlError> {
        let mut buffer = Vec::new();
        if indent == 0 {
            self.write_to(&mut Writer::new(&mut buffer))?;
        } else {
            self.write_to(&mut Writer::new_with_indent(&mut buffer, b' ', indent))?;
        }
        Ok(String::from_utf8(buffer).map_err(|e| e.utf8_error())?)
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement::new(std::str::from_utf8(start.name().as_ref())?);
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let raw = std::str::from_utf8(&attr.value)?;
        element
            .attributes
            .push((key.to_string(), quick_xml::escape::unescape(raw)?.into_owned()));
    }
    Ok(element)
}

/// Consumes the epilog after the root element; only comments, processing
/// instructions and whitespace may follow it.
fn finish_root<S: EventSource>(source: &mut S, root: XmlElement) -> Result<XmlElement, XmlError> {
    loop {
        match source.next_event()? {
            Event::Eof => return Ok(root),
            Event::Comment(_) | Event::PI(_) => {}
            Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => {}
            Event::Start(start) | Event::Empty(start) => {
                return Err(XmlError::UnexpectedContent(format!(
                    "second root element <{}>",
                    String::from_utf8_lossy(start.name().as_ref())
                )));
            }
            other => {
                return Err(XmlError::UnexpectedContent(format!(
                    "{:?} after the root element",
                    other
                )));
            }
        }
    }
}

/// Resolves a predefined entity or character reference.
fn resolve_entity(name: &str) -> Result<String, XmlError> {
    if let Some(resolved) = quick_xml::escape::resolve_xml_entity(name) {
        return Ok(resolved.to_string());
    }
    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => name.strip_prefix('#').and_then(|dec| dec.parse::<u32>().ok()),
    };
    match code.and_then(char::from_u32) {
        Some(c) => Ok(c.to_string()),
        None => Err(XmlError::UnresolvedEntity(name.to_string())),
    }
}
