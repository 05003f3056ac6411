//! Streaming XML event sources and the whitespace-filtering reader.
//!
//! Every unmarshalling path reads its input as a forward-only sequence of
//! quick-xml events. [`WhitespaceFilter`] sits between the raw parser and the
//! tree builder and drops the text events that only carry pretty-printing
//! (line breaks plus indentation), while keeping whitespace-only text made of
//! spaces or tabs, which may be the actual content of an element.
//!
//! quick-xml splits character data at every entity reference and CDATA
//! section, so the filter judges a whole run of adjacent text, reference and
//! CDATA events at once: `a &amp;\n&lt; b` is one piece of content even though
//! its middle fragment is a bare line break.

use std::collections::VecDeque;
use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::XmlError;

/// A forward-only source of owned XML events.
///
/// Once the input is exhausted the source keeps returning [`Event::Eof`].
pub trait EventSource {
    /// Returns the next event of the document.
    fn next_event(&mut self) -> Result<Event<'static>, XmlError>;
}

impl<S: EventSource + ?Sized> EventSource for &mut S {
    fn next_event(&mut self) -> Result<Event<'static>, XmlError> {
        (**self).next_event()
    }
}

/// Event source backed by a quick-xml reader over any buffered input.
pub struct ReaderSource<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> ReaderSource<R> {
    /// Creates a source that reports text exactly as written (no trimming).
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = false;
        config.check_end_names = true;
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Byte offset of the reader in the input.
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }
}

impl<'a> ReaderSource<&'a [u8]> {
    /// Creates a source over an in-memory document.
    pub fn from_slice(xml: &'a [u8]) -> Self {
        Self::new(xml)
    }
}

impl<R: BufRead> EventSource for ReaderSource<R> {
    fn next_event(&mut self) -> Result<Event<'static>, XmlError> {
        self.buf.clear();
        match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => Ok(event.into_owned()),
            Err(source) => Err(XmlError::Parse {
                position: self.position(),
                source,
            }),
        }
    }
}

/// Whether a text event carries only line-formatting whitespace.
///
/// Whitespace-only text is insignificant when it contains a line break;
/// runs of spaces and tabs on a single line are kept.
pub fn is_insignificant_whitespace(text: &[u8]) -> bool {
    text.iter()
        .all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
        && (text.is_empty() || text.iter().any(|b| matches!(b, b'\n' | b'\r')))
}

/// Entities every XML processor knows without a DTD.
fn is_predefined_entity(name: &[u8]) -> bool {
    matches!(name, b"amp" | b"lt" | b"gt" | b"quot" | b"apos") || name.starts_with(b"#")
}

/// Whether an event is part of an element's character data.
fn is_character_data(event: &Event<'_>) -> bool {
    matches!(event, Event::Text(_) | Event::GeneralRef(_) | Event::CData(_))
}

/// Whether a run of adjacent character events is pure line formatting.
///
/// Any reference or CDATA section makes the run content.
fn is_formatting_run(run: &[Event<'static>]) -> bool {
    let mut text = Vec::new();
    for event in run {
        match event {
            Event::Text(fragment) => text.extend_from_slice(fragment),
            _ => return false,
        }
    }
    is_insignificant_whitespace(&text)
}

/// Lazy adapter that removes indentation-only text events from a source.
///
/// The filter is non-restartable: it consumes the wrapped source as it goes
/// and stops after [`Event::Eof`] or the first error. It looks ahead only as
/// far as the end of the current run of character data.
pub struct WhitespaceFilter<S: EventSource> {
    source: S,
    skip_external_entities: bool,
    finished: bool,
    queued: VecDeque<Result<Event<'static>, XmlError>>,
}

impl<S: EventSource> WhitespaceFilter<S> {
    /// Wraps `source`. With `skip_external_entities`, DOCTYPE declarations and
    /// references to entities other than the predefined ones are discarded
    /// instead of being handed to the consumer.
    pub fn wrap(source: S, skip_external_entities: bool) -> Self {
        Self {
            source,
            skip_external_entities,
            finished: false,
            queued: VecDeque::new(),
        }
    }

    /// Returns the wrapped source.
    pub fn into_inner(self) -> S {
        self.source
    }

    fn is_skipped(&self, event: &Event<'_>) -> bool {
        match event {
            Event::DocType(_) => self.skip_external_entities,
            Event::GeneralRef(reference) => {
                self.skip_external_entities && !is_predefined_entity(reference)
            }
            _ => false,
        }
    }

    /// Next event of the source that survives entity skipping.
    fn pull(&mut self) -> Result<Event<'static>, XmlError> {
        loop {
            let event = self.source.next_event()?;
            if !self.is_skipped(&event) {
                return Ok(event);
            }
        }
    }

    /// Queues the next markup event, preceded by the character run before it
    /// unless that run is only line formatting.
    fn fill(&mut self) {
        let first = match self.pull() {
            Ok(event) if is_character_data(&event) => event,
            other => {
                self.queued.push_back(other);
                return;
            }
        };
        let mut run = vec![first];
        let terminator = loop {
            match self.pull() {
                Ok(event) if is_character_data(&event) => run.push(event),
                other => break other,
            }
        };
        if !is_formatting_run(&run) {
            self.queued.extend(run.into_iter().map(Ok));
        }
        self.queued.push_back(terminator);
    }
}

impl<S: EventSource> EventSource for WhitespaceFilter<S> {
    fn next_event(&mut self) -> Result<Event<'static>, XmlError> {
        loop {
            if let Some(item) = self.queued.pop_front() {
                if matches!(item, Ok(Event::Eof) | Err(_)) {
                    self.finished = true;
                }
                return item;
            }
            if self.finished {
                return Ok(Event::Eof);
            }
            self.fill();
        }
    }
}

impl<S: EventSource> Iterator for WhitespaceFilter<S> {
    type Item = Result<Event<'static>, XmlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_event() {
            Ok(Event::Eof) => None,
            other => Some(other),
        }
    }
}

/// The first start tag of a document, as seen by
/// [`Marshaller::can_unmarshal`](crate::Marshaller::can_unmarshal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartElement {
    /// Qualified name, including any prefix.
    pub name: String,
    /// Attributes in document order, namespace declarations included.
    pub attributes: Vec<(String, String)>,
}

impl StartElement {
    pub(crate) fn from_bytes(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let raw = std::str::from_utf8(&attr.value)?;
            let value = quick_xml::escape::unescape(raw)?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self { name, attributes })
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

    /// The default namespace declared on this element, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.attribute("xmlns")
    }
}

/// Strips a namespace prefix from a qualified name.
pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Whether an attribute name is a namespace declaration.
pub(crate) fn is_namespace_declaration(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

/// Reads events until the first start (or empty) element.
///
/// Returns `Ok(None)` when the document ends before any element.
pub fn peek_start_element<S: EventSource>(source: &mut S) -> Result<Option<StartElement>, XmlError> {
    loop {
        match source.next_event()? {
            Event::Start(start) | Event::Empty(start) => {
                return StartElement::from_bytes(&start).map(Some);
            }
            Event::Eof => return Ok(None),
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(xml: &str, skip_external_entities: bool) -> Vec<Event<'static>> {
        WhitespaceFilter::wrap(ReaderSource::from_slice(xml.as_bytes()), skip_external_entities)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn texts(events: &[Event<'static>]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_is_insignificant_whitespace() {
        assert!(is_insignificant_whitespace(b"\n"));
        assert!(is_insignificant_whitespace(b"\n    "));
        assert!(is_insignificant_whitespace(b"\r\n\t\t"));
        assert!(is_insignificant_whitespace(b""));
        assert!(!is_insignificant_whitespace(b" "));
        assert!(!is_insignificant_whitespace(b"\t"));
        assert!(!is_insignificant_whitespace(b"  \t "));
        assert!(!is_insignificant_whitespace(b"\n  x"));
    }

    #[test]
    fn test_drops_indentation_between_elements() {
        let events = collect("<order>\n   <id>1</id>\n   <note>a</note>\n</order>", false);
        assert_eq!(texts(&events), vec!["1", "a"]);
        let starts = events
            .iter()
            .filter(|event| matches!(event, Event::Start(_)))
            .count();
        assert_eq!(starts, 3);
    }

    #[test]
    fn test_keeps_tab_and_space_content() {
        let events = collect("<row>\n  <sep>\t</sep>\n  <pad> </pad>\n</row>", false);
        assert_eq!(texts(&events), vec!["\t", " "]);
    }

    #[test]
    fn test_line_break_between_references_is_content() {
        let events = collect("<body>a &amp;\n&lt; b</body>", false);
        assert_eq!(texts(&events), vec!["a ", "\n", " b"]);
        let references = events
            .iter()
            .filter(|event| matches!(event, Event::GeneralRef(_)))
            .count();
        assert_eq!(references, 2);
    }

    #[test]
    fn test_formatting_around_cdata_is_kept_with_it() {
        let events = collect("<a>\n  <![CDATA[x]]>\n</a>", false);
        assert_eq!(texts(&events), vec!["\n  ", "\n"]);

        let events = collect("<a>\n  <!-- c -->\n</a>", false);
        assert!(texts(&events).is_empty());
    }

    #[test]
    fn test_filter_is_fused_after_eof() {
        let mut filter = WhitespaceFilter::wrap(ReaderSource::from_slice(b"<a/>"), false);
        assert!(matches!(filter.next(), Some(Ok(Event::Empty(_)))));
        assert!(filter.next().is_none());
        assert!(matches!(filter.next_event(), Ok(Event::Eof)));
    }

    #[test]
    fn test_parse_errors_are_wrapped() {
        let mut filter =
            WhitespaceFilter::wrap(ReaderSource::from_slice(b"<a><b></a>"), false);
        let result: Result<Vec<_>, _> = filter.by_ref().collect();
        assert!(matches!(result, Err(XmlError::Parse { .. })));
        assert!(filter.next().is_none());
    }

    #[test]
    fn test_skip_external_entities_drops_doctype_and_unknown_refs() {
        let xml = "<!DOCTYPE note SYSTEM \"note.dtd\"><note>a&ext;&amp;b</note>";
        let kept = collect(xml, false);
        assert!(kept.iter().any(|e| matches!(e, Event::DocType(_))));
        assert_eq!(
            kept.iter()
                .filter(|e| matches!(e, Event::GeneralRef(_)))
                .count(),
            2
        );

        let skipped = collect(xml, true);
        assert!(!skipped.iter().any(|e| matches!(e, Event::DocType(_))));
        assert_eq!(
            skipped
                .iter()
                .filter(|e| matches!(e, Event::GeneralRef(_)))
                .count(),
            1
        );
    }

    #[test]
    fn test_peek_start_element() {
        let xml = "<?xml version=\"1.0\"?>\n<!-- c -->\n<p:order xmlns=\"urn:x\" id=\"7\"><a/></p:order>";
        let mut source = ReaderSource::from_slice(xml.as_bytes());
        let start = peek_start_element(&mut source).unwrap().unwrap();
        assert_eq!(start.name, "p:order");
        assert_eq!(start.local_name(), "order");
        assert_eq!(start.attribute("id"), Some("7"));
        assert_eq!(start.namespace(), Some("urn:x"));

        let mut empty = ReaderSource::from_slice(b"<!-- nothing -->");
        assert!(peek_start_element(&mut empty).unwrap().is_none());
    }

    #[test]
    fn test_local_name_and_namespace_declarations() {
        assert_eq!(local_name("a:b"), "b");
        assert_eq!(local_name("b"), "b");
        assert!(is_namespace_declaration("xmlns"));
        assert!(is_namespace_declaration("xmlns:fhir"));
        assert!(!is_namespace_declaration("xmlnsfoo"));
    }
}
