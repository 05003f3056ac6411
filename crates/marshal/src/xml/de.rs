//! XML deserialization implementation using custom serde::Deserializer.
//!
//! Deserialization runs over an [`XmlElement`] tree built from the filtered
//! event stream. Each element is presented to serde as a map whose keys are
//! `@`-prefixed attribute names, child element local names (repeated children
//! are grouped so they can fill a `Vec`) and, when the target struct asks for
//! it, `$text`. Namespace declarations are not reported as attributes.

use std::collections::HashMap;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::value::StringDeserializer;
use serde::de::{
    DeserializeOwned, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess,
    VariantAccess, Visitor,
};

use crate::error::XmlError;
use crate::events::{is_namespace_declaration, local_name};
use crate::tree::XmlElement;
use crate::xml::{ATTRIBUTE_PREFIX, TEXT_FIELD};

type Result<T> = std::result::Result<T, XmlError>;

/// Deserialize a value from an element tree.
///
/// Errors carry the slash-separated path of the element (or `@attribute`)
/// that could not be bound.
pub fn from_element<T>(element: &XmlElement) -> Result<T>
where
    T: DeserializeOwned,
{
    let path = element.local_name().to_string();
    T::deserialize(ElementDeserializer::new(element, path.clone()))
        .map_err(|error| located(error, &path))
}

/// Deserialize a value from an XML document string.
pub fn from_str<T>(xml: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    from_element(&XmlElement::parse(xml)?)
}

/// Attaches `path` unless a deeper path is already known.
fn located(error: XmlError, path: &str) -> XmlError {
    if error.path().is_some() {
        error
    } else {
        error.at(path.to_string())
    }
}

/// Deserializes a single element.
pub(crate) struct ElementDeserializer<'a> {
    element: &'a XmlElement,
    path: String,
}

impl<'a> ElementDeserializer<'a> {
    fn new(element: &'a XmlElement, path: String) -> Self {
        Self { element, path }
    }

    fn text(self) -> TextDeserializer {
        TextDeserializer::new(self.element.text(), self.path)
    }

    fn has_structure(&self) -> bool {
        self.element.has_child_elements()
            || self
                .element
                .attributes
                .iter()
                .any(|(key, _)| !is_namespace_declaration(key))
    }
}

macro_rules! forward_to_text {
    ($($method:ident)*) => {$(
        fn $method<V>(self, visitor: V) -> Result<V::Value>
        where
            V: Visitor<'de>,
        {
            self.text().$method(visitor)
        }
    )*};
}

impl<'de, 'a> Deserializer<'de> for ElementDeserializer<'a> {
    type Error = XmlError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if self.has_structure() {
            self.deserialize_map(visitor)
        } else {
            visitor.visit_string(self.element.text())
        }
    }

    forward_to_text! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_bytes deserialize_byte_buf deserialize_identifier
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let children = self.element.child_elements().collect();
        visitor.visit_seq(ElementSeqAccess::new(children, self.path))
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let with_text = !self.element.text().trim().is_empty();
        visitor.visit_map(ElementMapAccess::new(self.element, self.path, with_text))
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let with_text = fields.contains(&TEXT_FIELD);
        visitor.visit_map(ElementMapAccess::new(self.element, self.path, with_text))
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.element.child_elements().next() {
            Some(variant) => visitor.visit_enum(ElementEnumAccess {
                parent: self.element,
                variant,
                path: self.path,
            }),
            None => visitor.visit_enum(StringDeserializer::<XmlError>::new(
                self.element.text().trim().to_string(),
            )),
        }
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }
}

/// Deserializes the group of same-named children that make up one struct
/// field: a sequence when the target is a collection, the single element
/// otherwise.
pub(crate) struct FieldDeserializer<'a> {
    elements: Vec<&'a XmlElement>,
    path: String,
}

impl<'a> FieldDeserializer<'a> {
    fn single(self) -> Result<ElementDeserializer<'a>> {
        match self.elements.as_slice() {
            [element] => Ok(ElementDeserializer::new(*element, self.path)),
            elements => Err(XmlError::Custom(format!(
                "expected a single element, found {}",
                elements.len()
            ))),
        }
    }
}

macro_rules! forward_to_single {
    ($($method:ident)*) => {$(
        fn $method<V>(self, visitor: V) -> Result<V::Value>
        where
            V: Visitor<'de>,
        {
            self.single()?.$method(visitor)
        }
    )*};
}

impl<'de, 'a> Deserializer<'de> for FieldDeserializer<'a> {
    type Error = XmlError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        if self.elements.len() > 1 {
            self.deserialize_seq(visitor)
        } else {
            self.single()?.deserialize_any(visitor)
        }
    }

    forward_to_single! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_bytes deserialize_byte_buf deserialize_identifier
        deserialize_unit deserialize_map
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_unit_struct<V>(self, name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.single()?.deserialize_unit_struct(name, visitor)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_seq(ElementSeqAccess::new(self.elements, self.path))
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_struct<V>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.single()?.deserialize_struct(name, fields, visitor)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.single()?.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }
}

enum Entry<'a> {
    Text(String),
    Elements(Vec<&'a XmlElement>),
}

/// Presents an element as a map of attributes, child groups and text.
struct ElementMapAccess<'a> {
    entries: std::vec::IntoIter<(String, Entry<'a>)>,
    value: Option<(String, Entry<'a>)>,
    path: String,
}

impl<'a> ElementMapAccess<'a> {
    fn new(element: &'a XmlElement, path: String, with_text: bool) -> Self {
        let mut entries: Vec<(String, Entry<'a>)> = Vec::new();
        for (key, value) in &element.attributes {
            if is_namespace_declaration(key) {
                continue;
            }
            entries.push((
                format!("{}{}", ATTRIBUTE_PREFIX, local_name(key)),
                Entry::Text(value.clone()),
            ));
        }

        // Children are grouped by local name, in order of first appearance
        let mut groups: HashMap<&str, usize> = HashMap::new();
        for child in element.child_elements() {
            let name = child.local_name();
            match groups.get(name) {
                Some(&index) => {
                    if let (_, Entry::Elements(elements)) = &mut entries[index] {
                        elements.push(child);
                    }
                }
                None => {
                    groups.insert(name, entries.len());
                    entries.push((name.to_string(), Entry::Elements(vec![child])));
                }
            }
        }

        if with_text {
            entries.push((TEXT_FIELD.to_string(), Entry::Text(element.text())));
        }

        Self {
            entries: entries.into_iter(),
            value: None,
            path,
        }
    }
}

impl<'de, 'a> MapAccess<'de> for ElementMapAccess<'a> {
    type Error = XmlError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        match self.entries.next() {
            Some((key, entry)) => {
                let value = seed.deserialize(StringDeserializer::<XmlError>::new(key.clone()))?;
                self.value = Some((key, entry));
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        let (key, entry) = self
            .value
            .take()
            .ok_or_else(|| XmlError::Custom("map value requested before its key".to_string()))?;
        let path = if key == TEXT_FIELD {
            self.path.clone()
        } else {
            format!("{}/{}", self.path, key)
        };
        let result = match entry {
            Entry::Text(text) => seed.deserialize(TextDeserializer::new(text, path.clone())),
            Entry::Elements(elements) => seed.deserialize(FieldDeserializer {
                elements,
                path: path.clone(),
            }),
        };
        result.map_err(|error| located(error, &path))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

/// Sequence of sibling elements.
struct ElementSeqAccess<'a> {
    elements: std::vec::IntoIter<&'a XmlElement>,
    path: String,
    index: usize,
}

impl<'a> ElementSeqAccess<'a> {
    fn new(elements: Vec<&'a XmlElement>, path: String) -> Self {
        Self {
            elements: elements.into_iter(),
            path,
            index: 0,
        }
    }
}

impl<'de, 'a> SeqAccess<'de> for ElementSeqAccess<'a> {
    type Error = XmlError;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: DeserializeSeed<'de>,
    {
        let Some(element) = self.elements.next() else {
            return Ok(None);
        };
        let path = format!("{}[{}]", self.path, self.index);
        self.index += 1;
        seed.deserialize(ElementDeserializer::new(element, path.clone()))
            .map(Some)
            .map_err(|error| located(error, &path))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.elements.len())
    }
}

/// An enum written as `<field><Variant>...</Variant></field>`.
struct ElementEnumAccess<'a> {
    parent: &'a XmlElement,
    variant: &'a XmlElement,
    path: String,
}

impl<'de, 'a> EnumAccess<'de> for ElementEnumAccess<'a> {
    type Error = XmlError;
    type Variant = Self;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Self)>
    where
        V: DeserializeSeed<'de>,
    {
        let name = self.variant.local_name().to_string();
        let value = seed.deserialize(StringDeserializer::<XmlError>::new(name))?;
        Ok((value, self))
    }
}

impl<'de, 'a> VariantAccess<'de> for ElementEnumAccess<'a> {
    type Error = XmlError;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value>
    where
        T: DeserializeSeed<'de>,
    {
        let path = format!("{}/{}", self.path, self.variant.local_name());
        seed.deserialize(ElementDeserializer::new(self.variant, path.clone()))
            .map_err(|error| located(error, &path))
    }

    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let name = self.variant.local_name();
        let items = self
            .parent
            .child_elements()
            .filter(|child| child.local_name() == name)
            .collect();
        let path = format!("{}/{}", self.path, name);
        visitor.visit_seq(ElementSeqAccess::new(items, path))
    }

    fn struct_variant<V>(self, fields: &'static [&'static str], visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let path = format!("{}/{}", self.path, self.variant.local_name());
        ElementDeserializer::new(self.variant, path.clone())
            .deserialize_struct("", fields, visitor)
            .map_err(|error| located(error, &path))
    }
}

/// Deserializes attribute values and element text.
pub(crate) struct TextDeserializer {
    text: String,
    path: String,
}

impl TextDeserializer {
    fn new(text: String, path: String) -> Self {
        Self { text, path }
    }

    fn invalid(&self, expected: &'static str) -> XmlError {
        XmlError::InvalidValue {
            value: self.text.clone(),
            expected,
        }
        .at(self.path.clone())
    }

    fn parse<T: FromStr>(&self, expected: &'static str) -> Result<T> {
        self.text.trim().parse().map_err(|_| self.invalid(expected))
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident, $expected:literal;)*) => {$(
        fn $method<V>(self, visitor: V) -> Result<V::Value>
        where
            V: Visitor<'de>,
        {
            visitor.$visit(self.parse($expected)?)
        }
    )*};
}

impl<'de> Deserializer<'de> for TextDeserializer {
    type Error = XmlError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_string(self.text)
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.text.trim() {
            "true" | "1" => visitor.visit_bool(true),
            "false" | "0" => visitor.visit_bool(false),
            _ => Err(self.invalid("a boolean")),
        }
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8, "an integer";
        deserialize_i16 => visit_i16, "an integer";
        deserialize_i32 => visit_i32, "an integer";
        deserialize_i64 => visit_i64, "an integer";
        deserialize_i128 => visit_i128, "an integer";
        deserialize_u8 => visit_u8, "an unsigned integer";
        deserialize_u16 => visit_u16, "an unsigned integer";
        deserialize_u32 => visit_u32, "an unsigned integer";
        deserialize_u64 => visit_u64, "an unsigned integer";
        deserialize_u128 => visit_u128, "an unsigned integer";
        deserialize_f32 => visit_f32, "a number";
        deserialize_f64 => visit_f64, "a number";
    }

    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let mut chars = self.text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(self.invalid("a single character")),
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_string(self.text)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_string(self.text)
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match BASE64.decode(self.text.trim()) {
            Ok(bytes) => visitor.visit_byte_buf(bytes),
            Err(_) => Err(self.invalid("base64 data")),
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_enum(StringDeserializer::<XmlError>::new(
            self.text.trim().to_string(),
        ))
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! {
        seq tuple tuple_struct map struct identifier
    }
}
