//! Wrapper types and their resolution.
//!
//! A domain type that cannot (or should not) be bound directly can name a
//! wrapper: a serde-bindable shim built from the value right before it is
//! marshalled, and unwrapped right after it is unmarshalled.
//!
//! The wrapper is declared through the type's interfaces. An interface is
//! either the wrapping capability itself, carrying the wrapper as its type
//! argument, or a named interface which may extend others. Resolution walks
//! that declaration depth-first, in declaration order, and takes the first
//! capability it meets.
//!
//! ```rust
//! use helios_marshal::{Interface, TypeArg, Wrappable, WrapperBinding, XmlWrapper, resolve_wrapper};
//! use serde::{Deserialize, Serialize};
//!
//! struct Celsius(f64);
//!
//! #[derive(Serialize, Deserialize)]
//! #[serde(rename = "temperature")]
//! struct TemperatureXml {
//!     #[serde(rename = "@unit")]
//!     unit: String,
//!     #[serde(rename = "$text")]
//!     value: f64,
//! }
//!
//! impl XmlWrapper<Celsius> for TemperatureXml {
//!     fn wrap(value: &Celsius) -> Self {
//!         TemperatureXml { unit: "C".into(), value: value.0 }
//!     }
//!
//!     fn into_inner(self) -> Celsius {
//!         Celsius(self.value)
//!     }
//! }
//!
//! impl Wrappable for Celsius {
//!     fn interfaces() -> Vec<Interface<Self>> {
//!         vec![Interface::Named {
//!             name: "Measurement",
//!             extends: vec![Interface::Wrappable(TypeArg::Concrete(
//!                 WrapperBinding::of::<TemperatureXml>(),
//!             ))],
//!         }]
//!     }
//! }
//!
//! let binding = resolve_wrapper::<Celsius>().unwrap();
//! assert!(binding.type_name().ends_with("TemperatureXml"));
//! ```

use std::any::{TypeId, type_name};
use std::fmt;
use std::io::Write;

use tracing::debug;

use crate::context::Bindable;
use crate::error::{MarshalError, UnmarshalError, WrapperError};
use crate::marshaller::Marshaller;
use crate::source::XmlSource;

/// A bindable stand-in for a domain type `T`.
pub trait XmlWrapper<T>: Bindable {
    /// Builds the wrapper for `value`.
    fn wrap(value: &T) -> Self;

    /// Recovers the domain value.
    fn into_inner(self) -> T;
}

/// A domain type that declares its interfaces.
pub trait Wrappable: Sized + 'static {
    /// Interface declarations, in declaration order.
    fn interfaces() -> Vec<Interface<Self>>;
}

/// One interface declaration of a domain type `T`.
pub enum Interface<T> {
    /// The wrapping capability, with its type argument.
    Wrappable(TypeArg<T>),
    /// Any other interface and the interfaces it extends.
    Named {
        name: &'static str,
        extends: Vec<Interface<T>>,
    },
}

impl<T> Interface<T> {
    /// A named interface extending nothing.
    pub fn marker(name: &'static str) -> Self {
        Interface::Named {
            name,
            extends: Vec::new(),
        }
    }
}

/// The type argument of the wrapping capability.
pub enum TypeArg<T> {
    /// A concrete wrapper type.
    Concrete(WrapperBinding<T>),
    /// A generic wrapper type applied to arguments; the raw type is used.
    Parameterized {
        raw: WrapperBinding<T>,
        args: Vec<&'static str>,
    },
    /// The capability was declared without naming a wrapper.
    Placeholder,
}

type MarshalFn<T> = fn(&Marshaller, &T, &mut dyn Write) -> Result<(), MarshalError>;
type UnmarshalFn<T> = fn(&Marshaller, XmlSource<'_>) -> Result<T, UnmarshalError>;

/// Resolved wrapper of a domain type `T`.
pub struct WrapperBinding<T> {
    type_id: TypeId,
    type_name: &'static str,
    marshal: MarshalFn<T>,
    unmarshal: UnmarshalFn<T>,
}

impl<T> WrapperBinding<T> {
    /// Binding for the wrapper type `S`.
    pub fn of<S: XmlWrapper<T>>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            type_name: type_name::<S>(),
            marshal: marshal_through::<T, S>,
            unmarshal: unmarshal_through::<T, S>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Wraps `value` and marshals the wrapper.
    pub fn marshal(
        &self,
        marshaller: &Marshaller,
        value: &T,
        writer: &mut dyn Write,
    ) -> Result<(), MarshalError> {
        (self.marshal)(marshaller, value, writer)
    }

    /// Unmarshals a wrapper and unwraps it.
    pub fn unmarshal(
        &self,
        marshaller: &Marshaller,
        source: XmlSource<'_>,
    ) -> Result<T, UnmarshalError> {
        (self.unmarshal)(marshaller, source)
    }
}

impl<T> Clone for WrapperBinding<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WrapperBinding<T> {}

impl<T> PartialEq for WrapperBinding<T> {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl<T> fmt::Debug for WrapperBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WrapperBinding").field(&self.type_name).finish()
    }
}

fn marshal_through<T, S: XmlWrapper<T>>(
    marshaller: &Marshaller,
    value: &T,
    writer: &mut dyn Write,
) -> Result<(), MarshalError> {
    marshaller.marshal(&S::wrap(value), writer)
}

fn unmarshal_through<T, S: XmlWrapper<T>>(
    marshaller: &Marshaller,
    source: XmlSource<'_>,
) -> Result<T, UnmarshalError> {
    marshaller.unmarshal_source::<S>(source).map(S::into_inner)
}

enum Lookup<T> {
    Found(WrapperBinding<T>),
    Ambiguous,
    Missing,
}

fn search<T>(interfaces: &[Interface<T>]) -> Lookup<T> {
    for interface in interfaces {
        match interface {
            Interface::Wrappable(TypeArg::Placeholder) => return Lookup::Ambiguous,
            Interface::Wrappable(TypeArg::Concrete(binding)) => return Lookup::Found(*binding),
            Interface::Wrappable(TypeArg::Parameterized { raw, .. }) => {
                return Lookup::Found(*raw);
            }
            Interface::Named { extends, .. } => match search(extends) {
                Lookup::Missing => continue,
                hit => return hit,
            },
        }
    }
    Lookup::Missing
}

/// Finds the wrapper declared by `T`'s interfaces.
///
/// The result depends only on `T::interfaces()`.
pub fn resolve_wrapper<T: Wrappable>() -> Result<WrapperBinding<T>, WrapperError> {
    let domain = type_name::<T>();
    match search(&T::interfaces()) {
        Lookup::Found(binding) => {
            debug!(domain, wrapper = binding.type_name, "resolved wrapper type");
            Ok(binding)
        }
        Lookup::Ambiguous => Err(WrapperError::Ambiguous { domain }),
        Lookup::Missing => Err(WrapperError::NotInferable { domain }),
    }
}
