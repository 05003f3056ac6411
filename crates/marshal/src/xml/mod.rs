//! serde binding runtime for XML.
//!
//! Values are streamed to quick-xml events by [`ser`] and bound back from an
//! element tree by [`de`]. Both sides follow the same mapping:
//!
//! | Rust | XML |
//! |------|-----|
//! | struct | element, one child element per field |
//! | field renamed `@name` | attribute `name` on the enclosing element |
//! | field renamed `$text` | text content of the enclosing element |
//! | `Option::None` | nothing |
//! | `Vec<T>` | the field element, repeated |
//! | unit variant | the variant name as text |
//! | newtype, tuple or struct variant | a child element named after the variant |
//! | map | one child element per entry, named after the key |
//! | bytes | base64 text |
//!
//! Element and attribute names are matched on their local part; namespace
//! declarations are ignored on input.
//!
//! ## Examples
//!
//! ```rust
//! use helios_marshal::xml::{WriteOptions, from_str, to_string};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Note {
//!     #[serde(rename = "@lang")]
//!     lang: String,
//!     to: String,
//! }
//!
//! let note = Note { lang: "en".into(), to: "Tove".into() };
//! let xml = to_string(&note, "note", &WriteOptions::default()).unwrap();
//! assert_eq!(xml, r#"<note lang="en"><to>Tove</to></note>"#);
//! assert_eq!(from_str::<Note>(&xml).unwrap(), note);
//! ```

pub mod de;
pub mod ser;

/// Field-name prefix that maps a field to an attribute.
pub const ATTRIBUTE_PREFIX: &str = "@";

/// Field name that maps a field to the element's text content.
pub const TEXT_FIELD: &str = "$text";

pub use de::{from_element, from_str};
pub use ser::{WriteOptions, to_string, to_writer};
