//! XML serialization implementation using custom serde::Serializer.
//!
//! This module streams a value to quick-xml events as serde walks it. Struct
//! fields become child elements, `@`-prefixed fields become attributes of the
//! enclosing element and a `$text` field becomes its text content. Start tags
//! are held back until the first child or text is written so attributes can
//! still be added to them.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::ser::{self, Impossible, Serialize, Serializer};

use crate::error::XmlError;
use crate::xml::{ATTRIBUTE_PREFIX, TEXT_FIELD};

type Result<T> = std::result::Result<T, XmlError>;

/// Document-level settings of a serialization run.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Spaces per indentation level; 0 writes everything on one line.
    pub indent: usize,
    /// Write `<?xml version="1.0" encoding="UTF-8" standalone="yes"?>`.
    pub declaration: bool,
    /// System identifier of a `<!DOCTYPE>` declaration.
    pub doctype_system_id: Option<String>,
    /// Default namespace declared on the root element.
    pub namespace: Option<String>,
}

/// Serialize `value` as the document element `root` to `writer`.
///
/// Output is written as it is produced: when `value` fails half-way the
/// writer has already received a prefix of the document.
pub fn to_writer<T, W>(value: &T, root: &str, writer: W, options: &WriteOptions) -> Result<()>
where
    T: Serialize + ?Sized,
    W: Write,
{
    let mut serializer = XmlSerializer::new(writer, options);
    serializer.write_prolog(root, options)?;
    match value.serialize(ElementSerializer::new(&mut serializer, root)) {
        Ok(()) => {}
        Err(error @ XmlError::Io(_)) => return Err(error),
        Err(error) => return Err(error.at(serializer.path())),
    }
    serializer.finish()
}

/// Serialize `value` as the document element `root` to a string.
pub fn to_string<T>(value: &T, root: &str, options: &WriteOptions) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let mut buffer = Vec::new();
    to_writer(value, root, &mut buffer, options)?;
    Ok(String::from_utf8(buffer).map_err(|e| e.utf8_error())?)
}

/// XML Serializer that writes directly to quick-xml.
pub(crate) struct XmlSerializer<W: Write> {
    writer: Writer<W>,
    /// Start tag of the innermost element, not yet written
    pending: Option<BytesStart<'static>>,
    /// Names of the open elements, root first
    open: Vec<String>,
    root_namespace: Option<String>,
}

impl<W: Write> XmlSerializer<W> {
    fn new(writer: W, options: &WriteOptions) -> Self {
        let writer = if options.indent == 0 {
            Writer::new(writer)
        } else {
            Writer::new_with_indent(writer, b' ', options.indent)
        };
        Self {
            writer,
            pending: None,
            open: Vec::new(),
            root_namespace: options.namespace.clone(),
        }
    }

    fn write_prolog(&mut self, root: &str, options: &WriteOptions) -> Result<()> {
        if options.declaration {
            self.writer.write_event(Event::Decl(BytesDecl::new(
                "1.0",
                Some("UTF-8"),
                Some("yes"),
            )))?;
        }
        if let Some(system_id) = &options.doctype_system_id {
            let doctype = format!("{} SYSTEM \"{}\"", root, system_id);
            self.writer
                .write_event(Event::DocType(BytesText::from_escaped(doctype)))?;
        }
        Ok(())
    }

    /// Slash-separated path of the open elements.
    fn path(&self) -> String {
        self.open.join("/")
    }

    fn start_element(&mut self, name: &str) -> Result<()> {
        self.flush_pending()?;
        let mut start = BytesStart::new(name.to_string());
        if self.open.is_empty() {
            if let Some(namespace) = self.root_namespace.take() {
                start.push_attribute(("xmlns", namespace.as_str()));
            }
        }
        self.pending = Some(start);
        self.open.push(name.to_string());
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }

    fn attribute(&mut self, key: &str, value: &str) -> Result<()> {
        match self.pending.as_mut() {
            Some(start) => {
                start.push_attribute((key, value));
                Ok(())
            }
            None => Err(XmlError::Custom(format!(
                "attribute `{}` must be declared before any child element or text",
                key
            ))),
        }
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.flush_pending()?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        let name = self
            .open
            .pop()
            .ok_or_else(|| XmlError::Custom("no open element to close".to_string()))?;
        match self.pending.take() {
            Some(start) => self.writer.write_event(Event::Empty(start))?,
            None => self.writer.write_event(Event::End(BytesEnd::new(name)))?,
        }
        Ok(())
    }

    /// Writes `<name>text</name>`, or `<name/>` for empty text.
    fn leaf(&mut self, name: &str, text: &str) -> Result<()> {
        self.start_element(name)?;
        self.text(text)?;
        self.end_element()
    }

    /// Writes one struct or map entry of the innermost open element.
    fn entry<T>(&mut self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        if let Some(attribute) = key.strip_prefix(ATTRIBUTE_PREFIX) {
            if let Some(text) = value.serialize(TextSerializer)? {
                self.attribute(attribute, &text)?;
            }
            Ok(())
        } else if key == TEXT_FIELD {
            match value.serialize(TextSerializer)? {
                Some(text) => self.text(&text),
                None => Ok(()),
            }
        } else {
            value.serialize(ElementSerializer::new(self, key))
        }
    }

    fn finish(mut self) -> Result<()> {
        if !self.open.is_empty() {
            return Err(XmlError::Custom(format!(
                "serialization ended with <{}> still open",
                self.path()
            )));
        }
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

/// Serializes one value as an element with a known name.
pub(crate) struct ElementSerializer<'a, W: Write> {
    ser: &'a mut XmlSerializer<W>,
    name: &'a str,
}

impl<'a, W: Write> ElementSerializer<'a, W> {
    fn new(ser: &'a mut XmlSerializer<W>, name: &'a str) -> Self {
        Self { ser, name }
    }

    fn leaf(self, text: &str) -> Result<()> {
        self.ser.leaf(self.name, text)
    }
}

impl<'a, W: Write> Serializer for ElementSerializer<'a, W> {
    type Ok = ();
    type Error = XmlError;

    type SerializeSeq = SeqSerializer<'a, W>;
    type SerializeTuple = SeqSerializer<'a, W>;
    type SerializeTupleStruct = SeqSerializer<'a, W>;
    type SerializeTupleVariant = SeqSerializer<'a, W>;
    type SerializeMap = MapSerializer<'a, W>;
    type SerializeStruct = StructSerializer<'a, W>;
    type SerializeStructVariant = StructSerializer<'a, W>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.leaf(if v { "true" } else { "false" })
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_i128(self, v: i128) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_u128(self, v: u128) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        self.leaf(&v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<()> {
        self.leaf(v.encode_utf8(&mut [0u8; 4]))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.leaf(v)
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.leaf(&BASE64.encode(v))
    }

    fn serialize_none(self) -> Result<()> {
        Ok(())
    }

    fn serialize_some<T>(self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.leaf("")
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.leaf("")
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.leaf(variant)
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.ser.start_element(self.name)?;
        value.serialize(ElementSerializer::new(&mut *self.ser, variant))?;
        self.ser.end_element()
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(SeqSerializer {
            ser: self.ser,
            name: self.name,
            closes: 0,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.ser.start_element(self.name)?;
        Ok(SeqSerializer {
            ser: self.ser,
            name: variant,
            closes: 1,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        self.ser.start_element(self.name)?;
        Ok(MapSerializer {
            ser: self.ser,
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        self.ser.start_element(self.name)?;
        Ok(StructSerializer {
            ser: self.ser,
            closes: 1,
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        self.ser.start_element(self.name)?;
        self.ser.start_element(variant)?;
        Ok(StructSerializer {
            ser: self.ser,
            closes: 2,
        })
    }
}

/// Writes each item as a repeated element of the same name.
pub(crate) struct SeqSerializer<'a, W: Write> {
    ser: &'a mut XmlSerializer<W>,
    name: &'a str,
    /// Wrapping elements to close at the end (tuple variants)
    closes: usize,
}

impl<'a, W: Write> SeqSerializer<'a, W> {
    fn item<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(ElementSerializer::new(&mut *self.ser, self.name))
    }

    fn close(self) -> Result<()> {
        for _ in 0..self.closes {
            self.ser.end_element()?;
        }
        Ok(())
    }
}

impl<'a, W: Write> ser::SerializeSeq for SeqSerializer<'a, W> {
    type Ok = ();
    type Error = XmlError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.item(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, W: Write> ser::SerializeTuple for SeqSerializer<'a, W> {
    type Ok = ();
    type Error = XmlError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.item(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, W: Write> ser::SerializeTupleStruct for SeqSerializer<'a, W> {
    type Ok = ();
    type Error = XmlError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.item(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, W: Write> ser::SerializeTupleVariant for SeqSerializer<'a, W> {
    type Ok = ();
    type Error = XmlError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.item(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

/// Writes the fields of a struct (or struct variant) inside its element.
pub(crate) struct StructSerializer<'a, W: Write> {
    ser: &'a mut XmlSerializer<W>,
    closes: usize,
}

impl<'a, W: Write> StructSerializer<'a, W> {
    fn close(self) -> Result<()> {
        for _ in 0..self.closes {
            self.ser.end_element()?;
        }
        Ok(())
    }
}

impl<'a, W: Write> ser::SerializeStruct for StructSerializer<'a, W> {
    type Ok = ();
    type Error = XmlError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.ser.entry(key, value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, W: Write> ser::SerializeStructVariant for StructSerializer<'a, W> {
    type Ok = ();
    type Error = XmlError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.ser.entry(key, value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

/// Writes map entries as child elements named after their keys.
pub(crate) struct MapSerializer<'a, W: Write> {
    ser: &'a mut XmlSerializer<W>,
    key: Option<String>,
}

impl<'a, W: Write> ser::SerializeMap for MapSerializer<'a, W> {
    type Ok = ();
    type Error = XmlError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        match key.serialize(TextSerializer)? {
            Some(key) if !key.is_empty() => {
                self.key = Some(key);
                Ok(())
            }
            _ => Err(XmlError::Custom(
                "map keys must serialize to a non-empty name".to_string(),
            )),
        }
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = self
            .key
            .take()
            .ok_or_else(|| XmlError::Custom("map value without a key".to_string()))?;
        self.ser.entry(&key, value)
    }

    fn end(self) -> Result<()> {
        self.ser.end_element()
    }
}

/// Serializes scalar values to the text of an attribute or element.
///
/// `None` means "absent": the attribute or text is not written.
pub(crate) struct TextSerializer;

impl Serializer for TextSerializer {
    type Ok = Option<String>;
    type Error = XmlError;

    type SerializeSeq = Impossible<Option<String>, XmlError>;
    type SerializeTuple = Impossible<Option<String>, XmlError>;
    type SerializeTupleStruct = Impossible<Option<String>, XmlError>;
    type SerializeTupleVariant = Impossible<Option<String>, XmlError>;
    type SerializeMap = Impossible<Option<String>, XmlError>;
    type SerializeStruct = Impossible<Option<String>, XmlError>;
    type SerializeStructVariant = Impossible<Option<String>, XmlError>;

    fn serialize_bool(self, v: bool) -> Result<Option<String>> {
        Ok(Some(if v { "true" } else { "false" }.to_string()))
    }

    fn serialize_i8(self, v: i8) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_i16(self, v: i16) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_i32(self, v: i32) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_i64(self, v: i64) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_i128(self, v: i128) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_u8(self, v: u8) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_u16(self, v: u16) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_u32(self, v: u32) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_u64(self, v: u64) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_u128(self, v: u128) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_f32(self, v: f32) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_f64(self, v: f64) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_char(self, v: char) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Option<String>> {
        Ok(Some(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Option<String>> {
        Ok(Some(BASE64.encode(v)))
    }

    fn serialize_none(self) -> Result<Option<String>> {
        Ok(None)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Option<String>>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Option<String>> {
        Ok(Some(String::new()))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Option<String>> {
        Ok(Some(String::new()))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Option<String>> {
        Ok(Some(variant.to_string()))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Option<String>>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Option<String>>
    where
        T: Serialize + ?Sized,
    {
        Err(XmlError::Unsupported("a newtype variant"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(XmlError::Unsupported("a sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(XmlError::Unsupported("a tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(XmlError::Unsupported("a tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(XmlError::Unsupported("a tuple variant"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(XmlError::Unsupported("a map"))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(XmlError::Unsupported("a struct"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(XmlError::Unsupported("a struct variant"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap;

    fn compact() -> WriteOptions {
        WriteOptions::default()
    }

    #[derive(Serialize)]
    struct Line {
        #[serde(rename = "@sku")]
        sku: String,
        #[serde(rename = "@qty")]
        qty: u32,
        note: Option<String>,
    }

    #[derive(Serialize)]
    enum Status {
        Open,
        Held(String),
        Shipped { carrier: String },
    }

    #[derive(Serialize)]
    struct Order {
        #[serde(rename = "@id")]
        id: u64,
        customer: String,
        lines: Vec<Line>,
        status: Status,
        paid: bool,
    }

    #[test]
    fn test_struct_fields_attributes_and_sequences() -> Result<()> {
        let order = Order {
            id: 42,
            customer: "Ada & Co".to_string(),
            lines: vec![
                Line {
                    sku: "A-1".to_string(),
                    qty: 2,
                    note: None,
                },
                Line {
                    sku: "B-2".to_string(),
                    qty: 1,
                    note: Some("fragile".to_string()),
                },
            ],
            status: Status::Open,
            paid: true,
        };

        let xml = to_string(&order, "order", &compact())?;
        assert_eq!(
            xml,
            "<order id=\"42\"><customer>Ada &amp; Co</customer>\
             <lines sku=\"A-1\" qty=\"2\"/>\
             <lines sku=\"B-2\" qty=\"1\"><note>fragile</note></lines>\
             <status>Open</status><paid>true</paid></order>"
        );
        Ok(())
    }

    #[test]
    fn test_enum_variants_nest_under_field() -> Result<()> {
        #[derive(Serialize)]
        struct Shipment {
            a: Status,
            b: Status,
        }
        let xml = to_string(
            &Shipment {
                a: Status::Held("customs".to_string()),
                b: Status::Shipped {
                    carrier: "DHL".to_string(),
                },
            },
            "shipment",
            &compact(),
        )?;
        assert_eq!(
            xml,
            "<shipment><a><Held>customs</Held></a>\
             <b><Shipped><carrier>DHL</carrier></Shipped></b></shipment>"
        );
        Ok(())
    }

    #[test]
    fn test_text_field_maps_and_bytes() -> Result<()> {
        #[derive(Serialize)]
        struct Price {
            #[serde(rename = "@currency")]
            currency: &'static str,
            #[serde(rename = "$text")]
            amount: f64,
        }
        #[derive(Serialize)]
        struct Doc {
            price: Price,
            labels: BTreeMap<String, String>,
            blob: serde_bytes_like::Bytes,
        }
        mod serde_bytes_like {
            pub struct Bytes(pub Vec<u8>);
            impl serde::Serialize for Bytes {
                fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                    s.serialize_bytes(&self.0)
                }
            }
        }

        let mut labels = BTreeMap::new();
        labels.insert("color".to_string(), "red".to_string());
        let xml = to_string(
            &Doc {
                price: Price {
                    currency: "EUR",
                    amount: 12.5,
                },
                labels,
                blob: serde_bytes_like::Bytes(b"hi".to_vec()),
            },
            "doc",
            &compact(),
        )?;
        assert_eq!(
            xml,
            "<doc><price currency=\"EUR\">12.5</price>\
             <labels><color>red</color></labels><blob>aGk=</blob></doc>"
        );
        Ok(())
    }

    #[test]
    fn test_prolog_namespace_and_indent() -> Result<()> {
        #[derive(Serialize)]
        struct Note {
            to: String,
        }
        let options = WriteOptions {
            indent: 2,
            declaration: true,
            doctype_system_id: Some("note.dtd".to_string()),
            namespace: Some("urn:notes".to_string()),
        };
        let xml = to_string(
            &Note {
                to: "Tove".to_string(),
            },
            "note",
            &options,
        )?;
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <!DOCTYPE note SYSTEM \"note.dtd\">\n\
             <note xmlns=\"urn:notes\">\n  <to>Tove</to>\n</note>"
        );
        Ok(())
    }

    #[test]
    fn test_attribute_after_child_is_rejected() {
        #[derive(Serialize)]
        struct Bad {
            child: u8,
            #[serde(rename = "@late")]
            late: u8,
        }
        let err = to_string(&Bad { child: 1, late: 2 }, "bad", &compact()).unwrap_err();
        assert_eq!(err.path(), Some("bad"));
        assert!(err.to_string().contains("`late`"));
    }

    #[test]
    fn test_failure_keeps_written_prefix() {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _s: S) -> std::result::Result<S::Ok, S::Error> {
                Err(ser::Error::custom("already mutably borrowed"))
            }
        }
        #[derive(Serialize)]
        struct Holder {
            first: &'static str,
            second: Broken,
        }

        let mut out = Vec::new();
        let err = to_writer(
            &Holder {
                first: "kept",
                second: Broken,
            },
            "holder",
            &mut out,
            &compact(),
        )
        .unwrap_err();
        assert!(err.is_concurrent_modification());
        assert_eq!(err.path(), Some("holder"));
        assert_eq!(String::from_utf8(out).unwrap(), "<holder><first>kept</first>");
    }
}
