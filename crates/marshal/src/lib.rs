//! # Helios XML Marshalling
//!
//! This crate converts Rust values to XML documents and back, using serde as
//! the binding runtime and quick-xml for reading and writing.
//!
//! ## Features
//!
//! - **Cached binding contexts**: the per-type binding metadata of a set of
//!   types is built once and shared process-wide ([`ContextCache`]).
//! - **Wrapper types**: a domain type can declare a serde-bindable stand-in
//!   that is marshalled in its place ([`Wrappable`], [`XmlWrapper`]).
//! - **Whitespace filtering**: indentation between elements never reaches the
//!   binding layer; spaces and tabs that form element content do
//!   ([`WhitespaceFilter`]).
//! - **Best-effort helpers**: deep copy through XML and a non-destructive
//!   "can this be unmarshalled?" check.
//! - **Streaming bridge**: marshal on a background thread and read the
//!   document from a pipe while it is produced
//!   ([`Marshaller::marshal_async`]).
//!
//! ## XML mapping
//!
//! See the [`xml`] module for how structs, attributes, text, enums and
//! collections map to XML.
//!
//! ## Examples
//!
//! ```rust
//! use helios_marshal::{MarshalConfig, Marshaller};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! #[serde(rename = "order")]
//! struct Order {
//!     #[serde(rename = "@id")]
//!     id: u32,
//!     item: Vec<String>,
//! }
//!
//! let marshaller = Marshaller::new(MarshalConfig::default());
//! let order = Order { id: 7, item: vec!["bolt".into(), "nut".into()] };
//!
//! let xml = marshaller.marshal_to_string(&order)?;
//! assert!(xml.starts_with("<?xml"));
//! assert!(xml.contains("<item>nut</item>"));
//!
//! let back: Order = marshaller.unmarshal_str(&xml)?;
//! assert_eq!(back, order);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod marshaller;
pub mod pipe;
pub mod source;
pub mod tree;
pub mod wrapper;
pub mod xml;

pub use config::MarshalConfig;
pub use context::{Bindable, BindingContext, ClassSet, ClassSetKey, ContextCache, TypeMapping};
pub use error::{BindingError, MarshalError, UnmarshalError, WrapperError, XmlError};
pub use events::{
    EventSource, ReaderSource, StartElement, WhitespaceFilter, is_insignificant_whitespace,
    peek_start_element,
};
pub use marshaller::Marshaller;
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use source::XmlSource;
pub use tree::{XmlElement, XmlNode};
pub use wrapper::{Interface, TypeArg, Wrappable, WrapperBinding, XmlWrapper, resolve_wrapper};
