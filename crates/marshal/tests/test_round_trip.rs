mod common;

use std::io::Cursor;

use common::*;
use helios_marshal::{
    ClassSet, MarshalConfig, MarshalError, Marshaller, UnmarshalError, XmlElement, XmlError,
    XmlSource,
};
use serde::{Deserialize, Serialize};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[test]
fn test_direct_round_trip() -> Result<()> {
    let marshaller = marshaller();
    let order = sample_order();

    let xml = marshaller.marshal_to_string(&order)?;
    assert!(xml.starts_with("<order id=\"1042\">\n  <customer>"));
    assert!(xml.contains("<separator>\t</separator>"));
    assert!(xml.contains("Smith &amp; Sons &lt;Ltd&gt;"));

    let back: Order = marshaller.unmarshal(Cursor::new(xml.as_bytes()))?;
    assert_eq!(back, order);
    Ok(())
}

#[test]
fn test_round_trip_with_every_config_variant() -> Result<()> {
    let order = sample_order();
    for config in [
        MarshalConfig::default(),
        MarshalConfig {
            indent_width: 0,
            ..MarshalConfig::default()
        },
        MarshalConfig {
            xml_declaration: false,
            doctype_system_id: Some("order.dtd".to_string()),
            default_namespace: Some("urn:example:orders".to_string()),
            ..MarshalConfig::for_testing()
        },
    ] {
        let marshaller = Marshaller::new(config);
        let bytes = marshaller.marshal_to_vec(&order)?;
        assert_eq!(marshaller.unmarshal_slice::<Order>(&bytes)?, order);
    }
    Ok(())
}

#[test]
fn test_wrapped_round_trip() -> Result<()> {
    let marshaller = marshaller();
    let price = Money {
        currency: "EUR".to_string(),
        cents: 1999,
    };

    let mut buffer = Vec::new();
    marshaller.marshal_wrapped(&price, &mut buffer)?;
    assert_eq!(
        String::from_utf8(buffer.clone())?,
        "<money currency=\"EUR\">19.99</money>"
    );

    let back: Money = marshaller.unmarshal_wrapped(buffer.as_slice())?;
    assert_eq!(back, price);
    Ok(())
}

#[test]
fn test_path_round_trip() -> Result<()> {
    let marshaller = marshaller();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("order.xml");

    marshaller.marshal_to_path(&sample_order(), &path)?;
    assert_eq!(marshaller.unmarshal_path::<Order>(&path)?, sample_order());

    let url = url::Url::from_file_path(&path).map_err(|_| "not an absolute path")?;
    assert_eq!(marshaller.unmarshal_url::<Order>(url.as_str())?, sample_order());
    Ok(())
}

#[test]
fn test_marshal_to_missing_directory_reports_path() {
    let err = marshaller()
        .marshal_to_path(&sample_order(), "/no/such/dir/order.xml")
        .unwrap_err();
    assert!(matches!(err, MarshalError::File { .. }));
    assert!(err.to_string().contains("/no/such/dir/order.xml"));
}

#[test]
fn test_node_round_trip() -> Result<()> {
    let marshaller = marshaller();
    let mut batch = XmlElement::new("batch");
    marshaller.marshal_to_node(&sample_order(), &mut batch)?;
    marshaller.marshal_to_node(
        &Invoice {
            number: "INV-1".to_string(),
            total_cents: 500,
        },
        &mut batch,
    )?;

    let order = batch.child("order").ok_or("order element missing")?;
    assert_eq!(marshaller.unmarshal_node::<Order>(order)?, sample_order());
    let invoice = batch.child("invoice").ok_or("invoice element missing")?;
    assert_eq!(marshaller.unmarshal_node::<Invoice>(invoice)?.total_cents, 500);
    Ok(())
}

#[test]
fn test_unmarshal_shared_context() -> Result<()> {
    let marshaller = marshaller();
    let context = marshaller.context(&ClassSet::of::<Invoice>().with::<Receipt>())?;

    let invoice = Invoice {
        number: "INV-7".to_string(),
        total_cents: 1250,
    };
    let mut buffer = Vec::new();
    marshaller.marshal_in(&context, &invoice, &mut buffer)?;

    let any = marshaller.unmarshal_any(&context, XmlSource::Bytes(&buffer))?;
    assert_eq!(any.downcast_ref::<Invoice>(), Some(&invoice));

    let receipt: Receipt =
        marshaller.unmarshal_in(&context, XmlSource::Str("<receipt><number>R-1</number></receipt>"))?;
    assert_eq!(receipt.number, "R-1");
    Ok(())
}

#[test]
fn test_indented_input_from_elsewhere() -> Result<()> {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- exported by the warehouse -->
<order xmlns="urn:example:orders" id="7">
    <customer>Ada</customer>
    <lines sku="A" qty="1">
        <note> keep dry </note>
    </lines>
    <status>
        <Held>awaiting payment</Held>
    </status>
    <separator> </separator>
    <paid>0</paid>
</order>
"#;
    let order: Order = marshaller().unmarshal_str(xml)?;
    assert_eq!(order.id, 7);
    assert_eq!(order.lines[0].note.as_deref(), Some(" keep dry "));
    assert_eq!(order.status, Status::Held("awaiting payment".to_string()));
    assert_eq!(order.separator, " ");
    assert!(!order.paid);
    assert_eq!(order.comment, None);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "memo")]
struct Memo {
    body: String,
}

#[test]
fn test_line_breaks_between_escaped_characters_survive() -> Result<()> {
    let marshaller = marshaller();
    for body in ["a &\n< b", "&\n<", "x\n&amp;\n\ny"] {
        let memo = Memo {
            body: body.to_string(),
        };
        let xml = marshaller.marshal_to_string(&memo)?;
        assert_eq!(marshaller.unmarshal_str::<Memo>(&xml)?, memo, "{xml:?}");
        assert_eq!(marshaller.clone_object(memo.clone()), memo);
    }
    Ok(())
}

#[test]
fn test_bind_errors_locate_the_value() {
    let err = marshaller()
        .unmarshal_str::<Order>(
            "<order id=\"x\"><customer>a</customer><status>Open</status>\
             <separator/><paid>true</paid></order>",
        )
        .unwrap_err();
    match err {
        UnmarshalError::Bind { source, .. } => {
            assert_eq!(source.path(), Some("order/@id"));
            assert!(matches!(source.root_cause(), XmlError::InvalidValue { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_malformed_documents() {
    let marshaller = marshaller();
    for xml in ["", "<order>", "<order></invoice>", "<order>&bogus;</order>"] {
        let err = marshaller.unmarshal_str::<Order>(xml).unwrap_err();
        assert!(matches!(err, UnmarshalError::Parse(_)), "{xml:?}: {err}");
    }
}

#[test]
fn test_skip_external_entities() -> Result<()> {
    let xml = "<!DOCTYPE receipt SYSTEM \"receipt.dtd\"><receipt><number>R-&vendor;9</number></receipt>";
    let strict = marshaller();
    assert!(matches!(
        strict.unmarshal_str::<Receipt>(xml),
        Err(UnmarshalError::Parse(_))
    ));

    let lenient = Marshaller::new(MarshalConfig {
        skip_external_entities: true,
        ..MarshalConfig::for_testing()
    });
    assert_eq!(lenient.unmarshal_str::<Receipt>(xml)?.number, "R-9");
    Ok(())
}
