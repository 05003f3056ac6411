//! Unmarshalling inputs.
//!
//! Every input kind is turned into the same event pipeline:
//! a quick-xml reader, the whitespace filter, then the element tree.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::UnmarshalError;
use crate::events::{ReaderSource, WhitespaceFilter};
use crate::tree::XmlElement;

/// Where an XML document is read from.
pub enum XmlSource<'a> {
    /// Any buffered reader.
    Reader(Box<dyn BufRead + 'a>),
    /// An in-memory document.
    Bytes(&'a [u8]),
    /// An in-memory document.
    Str(&'a str),
    /// A local file.
    Path(PathBuf),
    /// A `file`, `http` or `https` URL.
    Url(Url),
    /// An element tree; its content is re-read like any other document.
    Node(&'a XmlElement),
}

impl<'a> XmlSource<'a> {
    pub fn reader<R: BufRead + 'a>(reader: R) -> Self {
        XmlSource::Reader(Box::new(reader))
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        XmlSource::Path(path.into())
    }

    /// Parses `url`; malformed URLs are reported as unsupported.
    pub fn url(url: &str) -> Result<Self, UnmarshalError> {
        Url::parse(url)
            .map(XmlSource::Url)
            .map_err(|e| UnmarshalError::UnsupportedUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    /// Opens the input and builds its root element.
    pub(crate) fn read_root(self, skip_external_entities: bool) -> Result<XmlElement, UnmarshalError> {
        match self {
            XmlSource::Reader(reader) => parse(reader, skip_external_entities),
            XmlSource::Bytes(bytes) => parse(bytes, skip_external_entities),
            XmlSource::Str(text) => parse(text.as_bytes(), skip_external_entities),
            XmlSource::Path(path) => {
                let file = File::open(&path).map_err(|source| UnmarshalError::File {
                    path: path.clone(),
                    source,
                })?;
                parse(BufReader::new(file), skip_external_entities)
            }
            XmlSource::Url(url) => read_url(url, skip_external_entities),
            XmlSource::Node(node) => {
                let xml = node.to_xml_string(0).map_err(UnmarshalError::Parse)?;
                parse(xml.as_bytes(), skip_external_entities)
            }
        }
    }
}

impl fmt::Debug for XmlSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XmlSource::Reader(_) => f.write_str("Reader(..)"),
            XmlSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            XmlSource::Str(text) => write!(f, "Str({} bytes)", text.len()),
            XmlSource::Path(path) => write!(f, "Path({})", path.display()),
            XmlSource::Url(url) => write!(f, "Url({})", url),
            XmlSource::Node(node) => write!(f, "Node(<{}>)", node.name),
        }
    }
}

impl<'a> From<&'a str> for XmlSource<'a> {
    fn from(text: &'a str) -> Self {
        XmlSource::Str(text)
    }
}

impl<'a> From<&'a [u8]> for XmlSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        XmlSource::Bytes(bytes)
    }
}

impl<'a> From<&'a Path> for XmlSource<'a> {
    fn from(path: &'a Path) -> Self {
        XmlSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for XmlSource<'_> {
    fn from(path: PathBuf) -> Self {
        XmlSource::Path(path)
    }
}

impl From<Url> for XmlSource<'_> {
    fn from(url: Url) -> Self {
        XmlSource::Url(url)
    }
}

impl<'a> From<&'a XmlElement> for XmlSource<'a> {
    fn from(node: &'a XmlElement) -> Self {
        XmlSource::Node(node)
    }
}

fn parse<R: BufRead>(input: R, skip_external_entities: bool) -> Result<XmlElement, UnmarshalError> {
    let mut events = WhitespaceFilter::wrap(ReaderSource::new(input), skip_external_entities);
    XmlElement::read_from(&mut events).map_err(UnmarshalError::Parse)
}

fn read_url(url: Url, skip_external_entities: bool) -> Result<XmlElement, UnmarshalError> {
    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| UnmarshalError::UnsupportedUrl {
                    url: url.to_string(),
                    reason: "not a local file path".to_string(),
                })?;
            XmlSource::Path(path).read_root(skip_external_entities)
        }
        "http" | "https" => fetch(url, skip_external_entities),
        scheme => Err(UnmarshalError::UnsupportedUrl {
            url: url.to_string(),
            reason: format!("scheme `{}` is not supported", scheme),
        }),
    }
}

#[cfg(feature = "remote")]
fn fetch(url: Url, skip_external_entities: bool) -> Result<XmlElement, UnmarshalError> {
    let fetch_error = |e: reqwest::Error| UnmarshalError::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    };
    let response = reqwest::blocking::get(url.as_str())
        .and_then(|response| response.error_for_status())
        .map_err(fetch_error)?;
    let body = response.bytes().map_err(fetch_error)?;
    parse(&body[..], skip_external_entities)
}

#[cfg(not(feature = "remote"))]
fn fetch(url: Url, _skip_external_entities: bool) -> Result<XmlElement, UnmarshalError> {
    Err(UnmarshalError::UnsupportedUrl {
        url: url.to_string(),
        reason: "fetching over HTTP requires the `remote` feature".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_every_in_memory_source_yields_the_same_tree() {
        let xml = "<note>\n  <to>Tove</to>\n</note>";
        let node = XmlElement::parse(xml).unwrap();
        let expected = XmlElement::new("note").with_child(XmlElement::new("to").with_text("Tove"));

        for source in [
            XmlSource::from(xml),
            XmlSource::from(xml.as_bytes()),
            XmlSource::reader(xml.as_bytes()),
            XmlSource::from(&node),
        ] {
            assert_eq!(source.read_root(false).unwrap(), expected);
        }
    }

    #[test]
    fn test_path_and_file_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<a><b>1</b></a>").unwrap();

        let root = XmlSource::from(file.path()).read_root(false).unwrap();
        assert_eq!(root.child("b").map(XmlElement::text), Some("1".to_string()));

        let url = Url::from_file_path(file.path()).unwrap();
        let root = XmlSource::from(url).read_root(false).unwrap();
        assert_eq!(root.name, "a");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = XmlSource::path("/definitely/not/here.xml")
            .read_root(false)
            .unwrap_err();
        assert!(matches!(err, UnmarshalError::File { ref path, .. } if path.ends_with("here.xml")));
    }

    #[test]
    fn test_unsupported_urls() {
        assert!(matches!(
            XmlSource::url("not a url"),
            Err(UnmarshalError::UnsupportedUrl { .. })
        ));
        let err = XmlSource::url("ftp://example.com/a.xml")
            .unwrap()
            .read_root(false)
            .unwrap_err();
        assert!(matches!(err, UnmarshalError::UnsupportedUrl { ref reason, .. } if reason.contains("ftp")));
    }

    #[cfg(not(feature = "remote"))]
    #[test]
    fn test_http_requires_remote_feature() {
        let err = XmlSource::url("https://example.com/a.xml")
            .unwrap()
            .read_root(false)
            .unwrap_err();
        assert!(matches!(err, UnmarshalError::UnsupportedUrl { .. }));
    }
}
