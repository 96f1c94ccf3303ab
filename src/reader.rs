//! Streaming XML event source.
//!
//! This module turns any `BufRead` into the flat sequence of
//! start-element / text / end-element events the engine consumes. It uses
//! `quick-xml`'s namespace-aware reader, so every name is delivered as a
//! resolved [`QName`].
//!
//! # Example
//!
//! ```rust
//! use xmlmap_rs::reader::{EventReader, XmlEvent};
//! use std::io::Cursor;
//!
//! let reader = EventReader::from_reader(Cursor::new("<a x=\"1\">hi</a>"));
//! let events: Vec<XmlEvent> = reader.collect::<Result<_, _>>().unwrap();
//! assert_eq!(events.len(), 3);
//! ```

use crate::error::{Error, Result};
use crate::name::QName;
use quick_xml::events::BytesStart;
use quick_xml::events::Event as RawEvent;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use std::collections::VecDeque;
use std::io::BufRead;
use std::str;

/// A single parse event delivered to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum XmlEvent {
    /// An element was opened
    Start {
        /// Element name
        name: QName,
        /// Attributes in document order
        attributes: Vec<(QName, String)>,
    },
    /// Character data (CDATA is delivered as text too)
    Text(String),
    /// An element was closed
    End {
        /// Element name
        name: QName,
    },
}

impl XmlEvent {
    /// Convenience constructor for a start event.
    pub fn start(name: impl Into<QName>, attributes: Vec<(QName, String)>) -> Self {
        XmlEvent::Start {
            name: name.into(),
            attributes,
        }
    }

    /// Convenience constructor for a text event.
    pub fn text(text: impl Into<String>) -> Self {
        XmlEvent::Text(text.into())
    }

    /// Convenience constructor for an end event.
    pub fn end(name: impl Into<QName>) -> Self {
        XmlEvent::End { name: name.into() }
    }
}

/// Event reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Trim leading and trailing whitespace from text, dropping
    /// whitespace-only text entirely
    pub trim_text: bool,
    /// Verify that end tags match their start tags
    pub check_end_names: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            trim_text: true,
            check_end_names: true,
        }
    }
}

impl ReaderConfig {
    /// Creates a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to trim text.
    pub fn with_trim_text(mut self, trim: bool) -> Self {
        self.trim_text = trim;
        self
    }

    /// Sets whether mismatched end tags are reported.
    pub fn with_check_end_names(mut self, check: bool) -> Self {
        self.check_end_names = check;
        self
    }
}

/// A streaming XML event source.
///
/// Reads from any `BufRead` and yields [`XmlEvent`]s one at a time without
/// building a tree. Self-closing elements are expanded into a start and an
/// end event; comments, processing instructions and declarations are
/// skipped; `xmlns` declarations are not reported as attributes.
pub struct EventReader<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    pending: VecDeque<XmlEvent>,
    done: bool,
}

impl<R: BufRead> EventReader<R> {
    /// Creates a new event reader with default configuration.
    pub fn from_reader(reader: R) -> Self {
        Self::with_config(reader, &ReaderConfig::default())
    }

    /// Creates a new event reader with the given configuration.
    pub fn with_config(reader: R, config: &ReaderConfig) -> Self {
        let mut xml_reader = NsReader::from_reader(reader);
        xml_reader.config_mut().trim_text(config.trim_text);
        xml_reader.config_mut().check_end_names = config.check_end_names;

        Self {
            reader: xml_reader,
            buf: Vec::with_capacity(4096),
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Reads the next engine event, or `None` at end of input.
    fn read_next(&mut self) -> Result<Option<XmlEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        loop {
            self.buf.clear();

            let (ns, event) = self.reader.read_resolved_event_into(&mut self.buf)?;
            let namespace = namespace_uri(ns)?;

            match event {
                RawEvent::Start(ref e) => {
                    let name = QName::new(namespace, local_name(e)?);
                    let attributes = Self::extract_attrs(&self.reader, e)?;
                    return Ok(Some(XmlEvent::Start { name, attributes }));
                }
                RawEvent::Empty(ref e) => {
                    let name = QName::new(namespace, local_name(e)?);
                    let attributes = Self::extract_attrs(&self.reader, e)?;
                    self.pending.push_back(XmlEvent::End { name: name.clone() });
                    return Ok(Some(XmlEvent::Start { name, attributes }));
                }
                RawEvent::End(ref e) => {
                    let local = e.local_name();
                    let name = QName::new(namespace, str::from_utf8(local.as_ref())?);
                    return Ok(Some(XmlEvent::End { name }));
                }
                RawEvent::Text(ref e) => {
                    let text = e.unescape()?;
                    if !text.is_empty() {
                        return Ok(Some(XmlEvent::Text(text.into_owned())));
                    }
                }
                RawEvent::CData(ref e) => {
                    let text = str::from_utf8(e.as_ref())?;
                    return Ok(Some(XmlEvent::Text(text.to_string())));
                }
                RawEvent::Eof => {
                    self.done = true;
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    /// Extracts attributes from a start tag as owned, namespace-resolved data.
    fn extract_attrs(reader: &NsReader<R>, e: &BytesStart<'_>) -> Result<Vec<(QName, String)>> {
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let (ns, local) = reader.resolve_attribute(attr.key);
            let name = QName::new(namespace_uri(ns)?, str::from_utf8(local.as_ref())?);
            let value = attr.unescape_value()?.into_owned();
            attrs.push((name, value));
        }
        Ok(attrs)
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<XmlEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done && self.pending.is_empty() {
            return None;
        }

        match self.read_next() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn local_name(e: &BytesStart<'_>) -> Result<String> {
    let local = e.local_name();
    Ok(str::from_utf8(local.as_ref())?.to_string())
}

fn namespace_uri(ns: ResolveResult<'_>) -> Result<Option<String>> {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => Ok(Some(str::from_utf8(uri)?.to_string())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(Error::Stream(format!(
            "unbound namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

/// Parses a boolean value from a string.
///
/// Accepts "1", "0", "true", "false" (case-insensitive).
pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Collects every event of a document into memory.
///
/// Handy for tests and small inputs; large documents should be streamed
/// with [`EventReader`] directly.
pub fn read_events<R: BufRead>(reader: R) -> Result<Vec<XmlEvent>> {
    EventReader::from_reader(reader).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CATALOG: &str = r#"<?xml version="1.0"?>
<catalog xmlns="urn:catalog" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <!-- a comment -->
  <book id="b1" dc:lang="en">
    <dc:title>Rust &amp; XML</dc:title>
    <price><![CDATA[12.50]]></price>
    <tag/>
  </book>
</catalog>"#;

    #[test]
    fn test_namespaces_resolved() {
        let events = read_events(Cursor::new(CATALOG)).unwrap();

        assert_eq!(
            events[0],
            XmlEvent::start(QName::qualified("urn:catalog", "catalog"), vec![])
        );
        match &events[1] {
            XmlEvent::Start { name, attributes } => {
                assert_eq!(name, &QName::qualified("urn:catalog", "book"));
                assert_eq!(
                    attributes,
                    &vec![
                        (QName::local("id"), "b1".to_string()),
                        (
                            QName::qualified("http://purl.org/dc/elements/1.1/", "lang"),
                            "en".to_string()
                        ),
                    ]
                );
            }
            other => panic!("expected start, got {other:?}"),
        }
        assert_eq!(
            events[2],
            XmlEvent::start(
                QName::qualified("http://purl.org/dc/elements/1.1/", "title"),
                vec![]
            )
        );
    }

    #[test]
    fn test_text_unescaped_and_cdata() {
        let events = read_events(Cursor::new(CATALOG)).unwrap();
        let texts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                XmlEvent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Rust & XML", "12.50"]);
    }

    #[test]
    fn test_empty_element_expanded() {
        let events = read_events(Cursor::new("<a><b/></a>")).unwrap();
        assert_eq!(
            events,
            vec![
                XmlEvent::start("a", vec![]),
                XmlEvent::start("b", vec![]),
                XmlEvent::end("b"),
                XmlEvent::end("a"),
            ]
        );
    }

    #[test]
    fn test_mismatched_end_is_error() {
        let result = read_events(Cursor::new("<a><b></a>"));
        assert!(result.is_err());
    }

    #[test]
    fn test_untrimmed_text() {
        let config = ReaderConfig::new().with_trim_text(false);
        let events: Vec<_> = EventReader::with_config(Cursor::new("<a> x </a>"), &config)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events[1], XmlEvent::text(" x "));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("invalid"), None);
    }
}
