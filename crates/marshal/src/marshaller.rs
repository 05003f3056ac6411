//! The marshalling façade.
//!
//! [`Marshaller`] ties the pieces together: it looks up (or builds) the
//! binding context of a type, writes values through the serde serializer,
//! and reads documents through the whitespace filter into the element tree
//! before binding them.

use std::any::{Any, type_name};
use std::fs::File;
use std::io::{BufRead, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, warn};

use crate::config::MarshalConfig;
use crate::context::{Bindable, BindingContext, ClassSet, ContextCache, TypeMapping};
use crate::error::{BindingError, MarshalError, UnmarshalError};
use crate::events::{ReaderSource, StartElement, WhitespaceFilter, local_name, peek_start_element};
use crate::pipe::{PipeReader, pipe};
use crate::source::XmlSource;
use crate::tree::XmlElement;
use crate::wrapper::{Wrappable, resolve_wrapper};
use crate::xml::{self, WriteOptions};

/// Name of the threads spawned by [`Marshaller::marshal_async`].
const ASYNC_THREAD_NAME: &str = "xml-marshal";

/// Marshals values to XML and unmarshals them back.
///
/// Cheap to clone; clones share the context cache.
#[derive(Debug, Clone)]
pub struct Marshaller {
    config: MarshalConfig,
    cache: Arc<ContextCache>,
}

impl Default for Marshaller {
    fn default() -> Self {
        Self::new(MarshalConfig::default())
    }
}

impl Marshaller {
    /// Creates a marshaller backed by the process-wide context cache.
    pub fn new(config: MarshalConfig) -> Self {
        Self::with_cache(config, ContextCache::global())
    }

    /// Creates a marshaller with its own context cache.
    ///
    /// Settings rejected by [`MarshalConfig::validate`] are logged at `warn`
    /// and used as given; use [`Marshaller::try_new`] to refuse them instead.
    pub fn with_cache(config: MarshalConfig, cache: Arc<ContextCache>) -> Self {
        if let Err(problems) = config.validate() {
            for problem in &problems {
                warn!(%problem, "invalid marshalling configuration");
            }
        }
        Self { config, cache }
    }

    /// Creates a marshaller backed by the process-wide context cache after
    /// validating `config`.
    pub fn try_new(config: MarshalConfig) -> Result<Self, Vec<String>> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    /// The cached context of `classes`.
    pub fn context(&self, classes: &ClassSet) -> Result<Arc<BindingContext>, BindingError> {
        self.cache.get(classes)
    }

    /// The cached context of the single type `T`.
    pub fn context_for<T: Bindable>(&self) -> Result<Arc<BindingContext>, BindingError> {
        self.context(&ClassSet::of::<T>())
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            indent: self.config.indent_width,
            declaration: self.config.xml_declaration,
            doctype_system_id: self.config.doctype_system_id.clone(),
            namespace: self.config.default_namespace.clone(),
        }
    }

    /// Writes `value` as an XML document.
    pub fn marshal<T: Bindable, W: Write>(&self, value: &T, writer: W) -> Result<(), MarshalError> {
        let context = self.context_for::<T>()?;
        self.marshal_in(&context, value, writer)
    }

    /// Writes `value` using an existing context, which must contain `T`.
    pub fn marshal_in<T: Bindable, W: Write>(
        &self,
        context: &BindingContext,
        value: &T,
        writer: W,
    ) -> Result<(), MarshalError> {
        let mapping = mapping_for_marshal::<T>(context)?;
        self.write_with(mapping, value, writer, &self.write_options())
    }

    fn write_with<T: Bindable, W: Write>(
        &self,
        mapping: &TypeMapping,
        value: &T,
        writer: W,
        options: &WriteOptions,
    ) -> Result<(), MarshalError> {
        xml::to_writer(value, mapping.root_element(), writer, options)
            .map_err(|e| MarshalError::from_serializer(type_name::<T>(), e))
    }

    pub fn marshal_to_vec<T: Bindable>(&self, value: &T) -> Result<Vec<u8>, MarshalError> {
        let mut buffer = Vec::new();
        self.marshal(value, &mut buffer)?;
        Ok(buffer)
    }

    pub fn marshal_to_string<T: Bindable>(&self, value: &T) -> Result<String, MarshalError> {
        let buffer = self.marshal_to_vec(value)?;
        String::from_utf8(buffer).map_err(|e| {
            MarshalError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Writes `value` to a file, replacing its content.
    pub fn marshal_to_path<T: Bindable>(
        &self,
        value: &T,
        path: impl AsRef<Path>,
    ) -> Result<(), MarshalError> {
        let path = path.as_ref();
        let file_error = |source| MarshalError::File {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(file_error)?;
        let mut writer = BufWriter::new(file);
        self.marshal(value, &mut writer)?;
        writer.flush().map_err(file_error)
    }

    /// Appends the element of `value` to the children of `parent`.
    ///
    /// No declaration or DOCTYPE is produced; the default namespace, when
    /// configured, is declared on the appended element.
    pub fn marshal_to_node<T: Bindable>(
        &self,
        value: &T,
        parent: &mut XmlElement,
    ) -> Result<(), MarshalError> {
        let context = self.context_for::<T>()?;
        let mapping = mapping_for_marshal::<T>(&context)?;
        let options = WriteOptions {
            indent: 0,
            declaration: false,
            doctype_system_id: None,
            namespace: self.config.default_namespace.clone(),
        };
        let mut buffer = Vec::new();
        self.write_with(mapping, value, &mut buffer, &options)?;

        let text = std::str::from_utf8(&buffer)
            .map_err(|e| MarshalError::from_serializer(type_name::<T>(), e.into()))?;
        let element =
            XmlElement::parse(text).map_err(|e| MarshalError::from_serializer(type_name::<T>(), e))?;
        parent.push_element(element);
        Ok(())
    }

    /// Wraps `value` in its declared wrapper type and marshals the wrapper.
    pub fn marshal_wrapped<T: Wrappable, W: Write>(
        &self,
        value: &T,
        mut writer: W,
    ) -> Result<(), MarshalError> {
        let binding = resolve_wrapper::<T>()?;
        binding.marshal(self, value, &mut writer)
    }

    /// Reads a `T` from a buffered reader.
    pub fn unmarshal<T: Bindable, R: BufRead>(&self, reader: R) -> Result<T, UnmarshalError> {
        self.unmarshal_source(XmlSource::reader(reader))
    }

    pub fn unmarshal_str<T: Bindable>(&self, xml: &str) -> Result<T, UnmarshalError> {
        self.unmarshal_source(XmlSource::Str(xml))
    }

    pub fn unmarshal_slice<T: Bindable>(&self, xml: &[u8]) -> Result<T, UnmarshalError> {
        self.unmarshal_source(XmlSource::Bytes(xml))
    }

    pub fn unmarshal_path<T: Bindable>(&self, path: impl AsRef<Path>) -> Result<T, UnmarshalError> {
        self.unmarshal_source(XmlSource::path(path.as_ref()))
    }

    /// Reads a `T` from a `file:` URL, or over HTTP with the `remote` feature.
    pub fn unmarshal_url<T: Bindable>(&self, url: &str) -> Result<T, UnmarshalError> {
        self.unmarshal_source(XmlSource::url(url)?)
    }

    pub fn unmarshal_node<T: Bindable>(&self, node: &XmlElement) -> Result<T, UnmarshalError> {
        self.unmarshal_source(XmlSource::Node(node))
    }

    /// Reads a `T` from any source.
    pub fn unmarshal_source<T: Bindable>(&self, source: XmlSource<'_>) -> Result<T, UnmarshalError> {
        let context = self.context_for::<T>()?;
        self.unmarshal_in(&context, source)
    }

    /// Reads a `T` using an existing context, which must contain `T`.
    pub fn unmarshal_in<T: Bindable>(
        &self,
        context: &BindingContext,
        source: XmlSource<'_>,
    ) -> Result<T, UnmarshalError> {
        let type_name = type_name::<T>();
        let mapping = context
            .mapping_of::<T>()
            .ok_or(UnmarshalError::UnknownType { type_name })?;
        let root = source.read_root(self.config.skip_external_entities)?;
        if root.local_name() != local_name(mapping.root_element()) {
            return Err(UnmarshalError::UnexpectedRoot {
                expected: format!("<{}>", mapping.root_element()),
                found: root.name,
            });
        }
        xml::from_element(&root).map_err(|source| UnmarshalError::Bind { type_name, source })
    }

    /// Reads whichever type of `context` the document's root element names.
    pub fn unmarshal_any(
        &self,
        context: &BindingContext,
        source: XmlSource<'_>,
    ) -> Result<Box<dyn Any + Send>, UnmarshalError> {
        let root = source.read_root(self.config.skip_external_entities)?;
        let Some(mapping) = context.mapping_by_root(root.local_name()) else {
            return Err(UnmarshalError::UnexpectedRoot {
                expected: context.root_names(),
                found: root.name,
            });
        };
        mapping.decode(&root).map_err(|source| UnmarshalError::Bind {
            type_name: mapping.type_name(),
            source,
        })
    }

    /// Unmarshals `T`'s declared wrapper type and unwraps it.
    pub fn unmarshal_wrapped<T: Wrappable, R: BufRead>(&self, reader: R) -> Result<T, UnmarshalError> {
        let binding = resolve_wrapper::<T>()?;
        binding.unmarshal(self, XmlSource::reader(reader))
    }

    /// Deep-copies `value` by marshalling it and reading it back.
    ///
    /// When either step fails the failure is logged and `value` itself is
    /// returned.
    pub fn clone_object<T: Bindable>(&self, value: T) -> T {
        let mut buffer = Vec::new();
        if let Err(error) = self.marshal(&value, &mut buffer) {
            warn!(
                type_name = type_name::<T>(),
                %error,
                "clone could not marshal the value; returning the original"
            );
            return value;
        }
        match self.unmarshal_slice::<T>(&buffer) {
            Ok(copy) => copy,
            Err(error) => {
                warn!(
                    type_name = type_name::<T>(),
                    %error,
                    "clone could not unmarshal the copy; returning the original"
                );
                value
            }
        }
    }

    /// Peeks at the first element of `reader` and asks `predicate` about it.
    ///
    /// The reader is moved back to where it was, so the document can still be
    /// unmarshalled afterwards. Returns `false` when the document cannot be
    /// read or the reader cannot be rewound.
    pub fn can_unmarshal<R, F>(&self, reader: &mut R, predicate: F) -> bool
    where
        R: BufRead + Seek,
        F: FnOnce(&StartElement) -> bool,
    {
        let start = match reader.stream_position() {
            Ok(position) => position,
            Err(error) => {
                warn!(%error, "cannot record the stream position");
                return false;
            }
        };

        let peeked = {
            let mut events = WhitespaceFilter::wrap(
                ReaderSource::new(&mut *reader),
                self.config.skip_external_entities,
            );
            peek_start_element(&mut events)
        };
        let accepted = match peeked {
            Ok(Some(element)) => predicate(&element),
            Ok(None) => false,
            Err(error) => {
                warn!(%error, "cannot read the first element");
                false
            }
        };

        if let Err(error) = reader.seek(SeekFrom::Start(start)) {
            warn!(%error, "cannot rewind the stream");
            return false;
        }
        accepted
    }

    /// Whether the document in `reader` has `T`'s root element.
    pub fn can_unmarshal_as<T: Bindable>(&self, reader: &mut (impl BufRead + Seek)) -> bool {
        let root = match self.context_for::<T>() {
            Ok(context) => match context.mapping_of::<T>() {
                Some(mapping) => local_name(mapping.root_element()).to_string(),
                None => return false,
            },
            Err(error) => {
                warn!(type_name = type_name::<T>(), %error, "type cannot be bound");
                return false;
            }
        };
        self.can_unmarshal(reader, |element| element.local_name() == root)
    }

    /// Marshals `value` on a background thread and returns the reading end
    /// of the stream it is written to.
    ///
    /// Failures never reach the caller: they are logged, and the reader sees
    /// whatever was written before the failure followed by end of stream.
    /// Dropping the reader stops the background thread at its next write.
    pub fn marshal_async<T: Bindable>(&self, value: T) -> PipeReader {
        let (reader, mut writer) = pipe(
            self.config.async_pipe_capacity,
            self.config.async_write_timeout(),
        );
        let marshaller = self.clone();
        let spawned = thread::Builder::new()
            .name(ASYNC_THREAD_NAME.to_string())
            .spawn(move || {
                match marshaller.marshal(&value, &mut writer) {
                    Ok(()) => debug!(type_name = type_name::<T>(), "background marshalling finished"),
                    Err(error) => warn!(
                        type_name = type_name::<T>(),
                        %error,
                        "background marshalling failed; stream truncated"
                    ),
                }
                writer.close();
            });
        if let Err(error) = spawned {
            // The closure, and the writer with it, has been dropped: the
            // reader sees an empty stream.
            error!(%error, "cannot spawn the background marshaller");
        }
        reader
    }
}

fn mapping_for_marshal<T: Bindable>(context: &BindingContext) -> Result<&TypeMapping, MarshalError> {
    context.mapping_of::<T>().ok_or(MarshalError::UnknownType {
        type_name: type_name::<T>(),
    })
}
