//! Binding contexts and the process-wide context cache.
//!
//! A [`BindingContext`] holds the compiled mapping of every type in a
//! [`ClassSet`]: its root element name and a type-erased decoder. Building one
//! means introspecting each type's serde description, so contexts are built
//! once per distinct class set and shared through [`ContextCache`].

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::{self, DeserializeOwned, Visitor};
use tracing::{debug, trace};

use crate::error::{BindingError, XmlError};
use crate::events::local_name;
use crate::tree::XmlElement;
use crate::xml;

/// A type the binding runtime can marshal and unmarshal.
pub trait Bindable: Serialize + DeserializeOwned + Send + 'static {}

impl<T> Bindable for T where T: Serialize + DeserializeOwned + Send + 'static {}

#[derive(Clone, Copy)]
struct ClassEntry {
    type_id: TypeId,
    type_name: &'static str,
    describe: fn() -> Result<TypeMapping, BindingError>,
}

/// An unordered, duplicate-free set of bindable types.
#[derive(Clone, Default)]
pub struct ClassSet {
    entries: Vec<ClassEntry>,
}

impl ClassSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding `T`.
    pub fn of<T: Bindable>() -> Self {
        Self::new().with::<T>()
    }

    /// Adds `T`, builder style. Adding a type twice has no effect.
    pub fn with<T: Bindable>(mut self) -> Self {
        self.insert::<T>();
        self
    }

    /// Adds `T`; returns `false` when it was already present.
    pub fn insert<T: Bindable>(&mut self) -> bool {
        let type_id = TypeId::of::<T>();
        if self.contains_id(type_id) {
            return false;
        }
        self.entries.push(ClassEntry {
            type_id,
            type_name: type_name::<T>(),
            describe: TypeMapping::describe::<T>,
        });
        true
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.contains_id(TypeId::of::<T>())
    }

    fn contains_id(&self, type_id: TypeId) -> bool {
        self.entries.iter().any(|entry| entry.type_id == type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The identity of the set, independent of insertion order.
    pub fn key(&self) -> ClassSetKey {
        let mut ids: Vec<TypeId> = self.entries.iter().map(|entry| entry.type_id).collect();
        ids.sort();
        ids.dedup();
        ClassSetKey(ids)
    }
}

impl fmt::Debug for ClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.entries.iter().map(|entry| entry.type_name))
            .finish()
    }
}

impl fmt::Display for ClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.entries.iter().map(|entry| entry.type_name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Cache key of a [`ClassSet`]: its sorted type identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassSetKey(Vec<TypeId>);

impl ClassSetKey {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

type Decoder = fn(&XmlElement) -> Result<Box<dyn Any + Send>, XmlError>;

/// Compiled binding metadata of one type.
#[derive(Clone)]
pub struct TypeMapping {
    type_id: TypeId,
    type_name: &'static str,
    root: &'static str,
    decode: Decoder,
}

impl TypeMapping {
    fn describe<T: Bindable>() -> Result<Self, BindingError> {
        let root = root_element_of::<T>()?;
        Ok(Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            root,
            decode: decode_as::<T>,
        })
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Name of the document element, as given by the type's serde name.
    pub fn root_element(&self) -> &'static str {
        self.root
    }

    /// Binds an element to a new boxed value of the mapped type.
    pub fn decode(&self, element: &XmlElement) -> Result<Box<dyn Any + Send>, XmlError> {
        (self.decode)(element)
    }
}

impl fmt::Debug for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMapping")
            .field("type_name", &self.type_name)
            .field("root", &self.root)
            .finish()
    }
}

fn decode_as<T: Bindable>(element: &XmlElement) -> Result<Box<dyn Any + Send>, XmlError> {
    let value: T = xml::from_element(element)?;
    Ok(Box::new(value))
}

/// Immutable binding metadata for a set of types.
#[derive(Debug)]
pub struct BindingContext {
    key: ClassSetKey,
    mappings: Vec<TypeMapping>,
    by_type: HashMap<TypeId, usize>,
    by_root: HashMap<&'static str, usize>,
}

impl BindingContext {
    /// Introspects every type of `classes`.
    pub fn build(classes: &ClassSet) -> Result<Self, BindingError> {
        if classes.is_empty() {
            return Err(BindingError::EmptyClassSet);
        }

        let mut mappings = Vec::with_capacity(classes.len());
        let mut by_type = HashMap::new();
        let mut by_root: HashMap<&'static str, usize> = HashMap::new();
        for entry in &classes.entries {
            let mapping = (entry.describe)()?;
            let root = local_name(mapping.root);
            if let Some(&existing) = by_root.get(root) {
                let first: &TypeMapping = &mappings[existing];
                return Err(BindingError::DuplicateRootElement {
                    root,
                    first: first.type_name,
                    second: mapping.type_name,
                });
            }
            by_root.insert(root, mappings.len());
            by_type.insert(mapping.type_id, mappings.len());
            mappings.push(mapping);
        }

        debug!(types = %classes, "built binding context");
        Ok(Self {
            key: classes.key(),
            mappings,
            by_type,
            by_root,
        })
    }

    pub fn key(&self) -> &ClassSetKey {
        &self.key
    }

    pub fn mappings(&self) -> &[TypeMapping] {
        &self.mappings
    }

    pub fn mapping_of<T: 'static>(&self) -> Option<&TypeMapping> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|&index| &self.mappings[index])
    }

    /// The mapping whose root element has the given local name.
    pub fn mapping_by_root(&self, local_name: &str) -> Option<&TypeMapping> {
        self.by_root
            .get(local_name)
            .map(|&index| &self.mappings[index])
    }

    pub fn is_root_element(&self, local_name: &str) -> bool {
        self.by_root.contains_key(local_name)
    }

    /// Root element names known to this context, for error messages.
    pub(crate) fn root_names(&self) -> String {
        let names: Vec<String> = self
            .mappings
            .iter()
            .map(|mapping| format!("<{}>", mapping.root))
            .collect();
        names.join(" or ")
    }
}

static GLOBAL_CACHE: Lazy<Arc<ContextCache>> = Lazy::new(|| Arc::new(ContextCache::new()));

/// Thread-safe cache of binding contexts keyed by class set.
///
/// Entries are never evicted.
#[derive(Debug, Default)]
pub struct ContextCache {
    contexts: RwLock<HashMap<ClassSetKey, Arc<BindingContext>>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> Arc<ContextCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    /// Returns the context of `classes`, building it on first use.
    ///
    /// Two threads missing on the same set may both build a context; the
    /// first insert wins and both get that instance. Failed builds are not
    /// cached.
    pub fn get(&self, classes: &ClassSet) -> Result<Arc<BindingContext>, BindingError> {
        let key = classes.key();
        if let Some(context) = self.contexts.read().get(&key).cloned() {
            trace!(types = %classes, "binding context cache hit");
            return Ok(context);
        }

        let built = Arc::new(BindingContext::build(classes)?);
        let mut contexts = self.contexts.write();
        let context = contexts.entry(key).or_insert_with(|| built.clone());
        Ok(Arc::clone(context))
    }

    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}

/// Finds the root element name of `T` by running its `Deserialize` impl
/// against a deserializer that stops at the first container description.
fn root_element_of<T: Bindable>() -> Result<&'static str, BindingError> {
    let not_bindable = |reason: String| BindingError::NotBindable {
        type_name: type_name::<T>(),
        reason,
    };
    match T::deserialize(RootProbe) {
        Err(Probe::Root(name)) if !name.is_empty() => Ok(name),
        Err(Probe::Root(_)) => Err(not_bindable("its serde name is empty".to_string())),
        Err(Probe::Shape(reason)) => Err(not_bindable(reason)),
        Ok(_) => Err(not_bindable(
            "its Deserialize impl does not describe an element".to_string(),
        )),
    }
}

#[derive(Debug)]
enum Probe {
    Root(&'static str),
    Shape(String),
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Root(name) => write!(f, "root element {}", name),
            Probe::Shape(reason) => f.write_str(reason),
        }
    }
}

impl std::error::Error for Probe {}

impl de::Error for Probe {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Probe::Shape(msg.to_string())
    }
}

struct RootProbe;

impl<'de> de::Deserializer<'de> for RootProbe {
    type Error = Probe;

    fn deserialize_any<V>(self, _visitor: V) -> Result<V::Value, Probe>
    where
        V: Visitor<'de>,
    {
        Err(Probe::Shape(
            "only structs and newtype structs can be document elements".to_string(),
        ))
    }

    fn deserialize_struct<V>(
        self,
        name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Probe>
    where
        V: Visitor<'de>,
    {
        Err(Probe::Root(name))
    }

    fn deserialize_newtype_struct<V>(self, name: &'static str, _visitor: V) -> Result<V::Value, Probe>
    where
        V: Visitor<'de>,
    {
        Err(Probe::Root(name))
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Probe>
    where
        V: Visitor<'de>,
    {
        Err(Probe::Shape(format!(
            "enum `{}` has no single document element",
            name
        )))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct seq tuple tuple_struct map
        identifier ignored_any
    }
}
