//! Error types for XML marshalling.
//!
//! The hierarchy separates the low-level binding runtime (`XmlError`, raised by
//! the serde serializer/deserializer and the event pipeline) from the errors
//! surfaced by the public operations: context construction, wrapper
//! resolution, marshalling and unmarshalling.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

/// Messages serde's std impls report when a `RefCell`, `Mutex` or `RwLock`
/// cannot be read while the object graph is being walked.
const CONCURRENT_MODIFICATION_MARKERS: [&str; 2] =
    ["already mutably borrowed", "lock poison error"];

/// Errors raised by the XML binding runtime.
#[derive(Error, Debug)]
pub enum XmlError {
    /// The underlying quick-xml reader rejected the input.
    #[error("XML parse error at byte {position}: {source}")]
    Parse {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    /// quick-xml failed while writing events.
    #[error("XML write error: {0}")]
    Write(#[from] quick_xml::Error),

    #[error("malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("invalid escape sequence: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error("invalid UTF-8 in XML content: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document contained no root element.
    #[error("XML document has no root element")]
    EmptyDocument,

    #[error("unexpected end of document inside <{0}>")]
    UnexpectedEof(String),

    #[error("unexpected content outside the root element: {0}")]
    UnexpectedContent(String),

    #[error("unresolved entity reference &{0};")]
    UnresolvedEntity(String),

    #[error("invalid value {value:?}: expected {expected}")]
    InvalidValue {
        value: String,
        expected: &'static str,
    },

    #[error("{0} cannot be represented as XML text")]
    Unsupported(&'static str),

    /// An error raised below an element, annotated with the element path.
    #[error("at {path}: {source}")]
    At {
        path: String,
        #[source]
        source: Box<XmlError>,
    },

    #[error("{0}")]
    Custom(String),
}

impl XmlError {
    /// Annotates the error with the element path it occurred under.
    pub(crate) fn at(self, path: String) -> Self {
        if path.is_empty() {
            return self;
        }
        XmlError::At {
            path,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping path annotations.
    pub fn root_cause(&self) -> &XmlError {
        match self {
            XmlError::At { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns the element path attached to this error, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            XmlError::At { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether a `Serialize` impl failed because a shared cell was changed
    /// (or poisoned) while it was being walked.
    pub fn is_concurrent_modification(&self) -> bool {
        match self.root_cause() {
            XmlError::Custom(message) => CONCURRENT_MODIFICATION_MARKERS
                .iter()
                .any(|marker| message.contains(marker)),
            _ => false,
        }
    }
}

impl serde::ser::Error for XmlError {
    fn custom<T: Display>(msg: T) -> Self {
        XmlError::Custom(msg.to_string())
    }
}

impl serde::de::Error for XmlError {
    fn custom<T: Display>(msg: T) -> Self {
        XmlError::Custom(msg.to_string())
    }
}

/// Errors raised while building a [`BindingContext`](crate::BindingContext).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("cannot build a binding context from an empty class set")]
    EmptyClassSet,

    #[error("type `{type_name}` cannot be bound to XML: {reason}")]
    NotBindable {
        type_name: &'static str,
        reason: String,
    },

    #[error("root element <{root}> is claimed by both `{first}` and `{second}`")]
    DuplicateRootElement {
        root: &'static str,
        first: &'static str,
        second: &'static str,
    },
}

/// Errors raised by the wrapper-type resolver.
///
/// These indicate a declaration mistake on the domain type, not bad data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WrapperError {
    #[error("ambiguous wrapper type for `{domain}`: the wrapper capability is declared without a concrete wrapper")]
    Ambiguous { domain: &'static str },

    #[error("no wrapper type could be inferred for `{domain}`")]
    NotInferable { domain: &'static str },
}

/// Errors raised while marshalling a value to XML.
#[derive(Error, Debug)]
pub enum MarshalError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Wrapper(#[from] WrapperError),

    #[error("type `{type_name}` is not part of the binding context")]
    UnknownType { type_name: &'static str },

    /// The object graph changed while it was being serialized.
    #[error("`{type_name}` was modified while being marshalled (at {path}): {message}")]
    ConcurrentModification {
        type_name: &'static str,
        path: String,
        message: String,
    },

    #[error("failed to marshal `{type_name}`: {source}")]
    Serialize {
        type_name: &'static str,
        #[source]
        source: XmlError,
    },

    #[error("failed to write {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while marshalling: {0}")]
    Io(#[from] std::io::Error),
}

impl MarshalError {
    /// Classifies a serializer failure for the value of type `type_name`.
    pub(crate) fn from_serializer(type_name: &'static str, error: XmlError) -> Self {
        if error.is_concurrent_modification() {
            return MarshalError::ConcurrentModification {
                type_name,
                path: error.path().unwrap_or("/").to_string(),
                message: error.root_cause().to_string(),
            };
        }
        match error {
            XmlError::Io(source) => MarshalError::Io(source),
            source => MarshalError::Serialize { type_name, source },
        }
    }
}

/// Errors raised while unmarshalling XML into a value.
#[derive(Error, Debug)]
pub enum UnmarshalError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Wrapper(#[from] WrapperError),

    #[error("type `{type_name}` is not part of the binding context")]
    UnknownType { type_name: &'static str },

    /// The input is not well-formed XML.
    #[error("failed to read XML: {0}")]
    Parse(#[source] XmlError),

    #[error("unexpected root element <{found}>, expected {expected}")]
    UnexpectedRoot { expected: String, found: String },

    #[error("failed to bind XML to `{type_name}`: {source}")]
    Bind {
        type_name: &'static str,
        #[source]
        source: XmlError,
    },

    #[error("failed to open {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported URL {url}: {reason}")]
    UnsupportedUrl { url: String, reason: String },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("I/O error while unmarshalling: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;

    #[test]
    fn test_at_wraps_and_exposes_path() {
        let err = XmlError::custom("boom").at("order/line".to_string());
        assert_eq!(err.path(), Some("order/line"));
        assert!(matches!(err.root_cause(), XmlError::Custom(m) if m == "boom"));
        assert_eq!(err.to_string(), "at order/line: boom");
    }

    #[test]
    fn test_at_with_empty_path_is_identity() {
        let err = XmlError::custom("boom").at(String::new());
        assert!(err.path().is_none());
    }

    #[test]
    fn test_concurrent_modification_detection() {
        assert!(XmlError::custom("already mutably borrowed").is_concurrent_modification());
        assert!(
            XmlError::custom("lock poison error while serializing")
                .at("a/b".to_string())
                .is_concurrent_modification()
        );
        assert!(!XmlError::custom("invalid length").is_concurrent_modification());
    }

    #[test]
    fn test_from_serializer_classifies() {
        let err = MarshalError::from_serializer(
            "Order",
            XmlError::custom("already mutably borrowed").at("order/lines".to_string()),
        );
        match err {
            MarshalError::ConcurrentModification {
                type_name, path, ..
            } => {
                assert_eq!(type_name, "Order");
                assert_eq!(path, "order/lines");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = MarshalError::from_serializer("Order", XmlError::Unsupported("a map"));
        assert!(matches!(err, MarshalError::Serialize { .. }));
    }

    #[test]
    fn test_wrapper_error_names_domain() {
        let err = WrapperError::Ambiguous { domain: "app::Invoice" };
        assert!(err.to_string().contains("app::Invoice"));
    }
}
