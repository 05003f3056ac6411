//! Shared fixtures for the marshalling integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use helios_marshal::{
    ContextCache, Interface, MarshalConfig, Marshaller, TypeArg, Wrappable, WrapperBinding,
    XmlWrapper,
};
use serde::{Deserialize, Serialize};

/// A marshaller with test settings and a private context cache.
pub fn marshaller() -> Marshaller {
    Marshaller::with_cache(MarshalConfig::for_testing(), Arc::new(ContextCache::new()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(rename = "@sku")]
    pub sku: String,
    #[serde(rename = "@qty")]
    pub qty: u32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Status {
    Open,
    Held(String),
    Shipped { carrier: String, tracking: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "order")]
pub struct Order {
    #[serde(rename = "@id")]
    pub id: u64,
    pub customer: String,
    #[serde(default)]
    pub lines: Vec<Line>,
    pub status: Status,
    pub comment: Option<String>,
    pub separator: String,
    pub paid: bool,
}

pub fn sample_order() -> Order {
    Order {
        id: 1042,
        customer: "Smith & Sons <Ltd>".to_string(),
        lines: vec![
            Line {
                sku: "BOLT-8".to_string(),
                qty: 250,
                note: None,
            },
            Line {
                sku: "NUT-8".to_string(),
                qty: 250,
                note: Some("zinc \"plated\"".to_string()),
            },
        ],
        status: Status::Shipped {
            carrier: "DHL".to_string(),
            tracking: vec!["JD0001".to_string(), "JD0002".to_string()],
        },
        comment: None,
        separator: "\t".to_string(),
        paid: true,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "invoice")]
pub struct Invoice {
    pub number: String,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "receipt")]
pub struct Receipt {
    pub number: String,
}

/// A domain type with no serde support, marshalled through [`MoneyXml`].
#[derive(Debug, Clone, PartialEq)]
pub struct Money {
    pub currency: String,
    pub cents: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "money")]
pub struct MoneyXml {
    #[serde(rename = "@currency")]
    currency: String,
    #[serde(rename = "$text")]
    amount: String,
}

impl XmlWrapper<Money> for MoneyXml {
    fn wrap(value: &Money) -> Self {
        MoneyXml {
            currency: value.currency.clone(),
            amount: format!("{}.{:02}", value.cents / 100, value.cents % 100),
        }
    }

    fn into_inner(self) -> Money {
        let (units, fraction) = self.amount.split_once('.').unwrap_or((self.amount.as_str(), "0"));
        Money {
            currency: self.currency,
            cents: units.parse::<i64>().unwrap_or(0) * 100 + fraction.parse::<i64>().unwrap_or(0),
        }
    }
}

impl Wrappable for Money {
    fn interfaces() -> Vec<Interface<Self>> {
        vec![
            Interface::marker("Comparable"),
            Interface::Named {
                name: "Ledgered",
                extends: vec![Interface::Wrappable(TypeArg::Concrete(
                    WrapperBinding::of::<MoneyXml>(),
                ))],
            },
        ]
    }
}

/// Declares the wrapping capability without naming a wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct Opaque(pub u8);

impl Wrappable for Opaque {
    fn interfaces() -> Vec<Interface<Self>> {
        vec![Interface::Wrappable(TypeArg::Placeholder)]
    }
}

/// Declares no wrapping capability at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Plain(pub u8);

impl Wrappable for Plain {
    fn interfaces() -> Vec<Interface<Self>> {
        vec![Interface::marker("Comparable")]
    }
}
