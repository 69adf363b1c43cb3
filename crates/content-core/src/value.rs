//! The internal property value union and its type tags.
//!
//! Spec §3 mentions an "internal value union" for property values without
//! enumerating variants. `SPEC_FULL.md` supplements concrete variants
//! grounded in the JCR `PropertyType` set implied by the spec's own examples
//! (`A.setProperty("p", 42)`, `jcr:isCheckedOut == true`).

use std::fmt;

use chrono::{DateTime, Utc};
use strum::{Display, EnumString};

use crate::{id::NodeId, Error, Result};

/// The type tag of a property's values (JCR `PropertyType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PropertyType {
    String,
    Binary,
    Long,
    Double,
    Date,
    Boolean,
    Name,
    Path,
    Reference,
    WeakReference,
    Uri,
    Decimal,
    /// Matches the definition's required type regardless of the actual type.
    Undefined,
}

/// One value in the internal union. A property's `values` array (spec §3)
/// is `Vec<Value>`; single-valued properties hold exactly one element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Binary(Vec<u8>),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
    Boolean(bool),
    Name(crate::names::QName),
    Path(crate::path::Path),
    Reference(NodeId),
    WeakReference(NodeId),
    Uri(String),
    Decimal(String),
}

impl Value {
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Binary(_) => PropertyType::Binary,
            Self::Long(_) => PropertyType::Long,
            Self::Double(_) => PropertyType::Double,
            Self::Date(_) => PropertyType::Date,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Name(_) => PropertyType::Name,
            Self::Path(_) => PropertyType::Path,
            Self::Reference(_) => PropertyType::Reference,
            Self::WeakReference(_) => PropertyType::WeakReference,
            Self::Uri(_) => PropertyType::Uri,
            Self::Decimal(_) => PropertyType::Decimal,
        }
    }

    /// Coerce to a long, the way `Node.setProperty("p", 42)` in spec §8's
    /// S1 scenario implies an integer literal is accepted.
    pub fn as_long(&self) -> Result<i64> {
        match self {
            Self::Long(v) => Ok(*v),
            Self::Double(v) => Ok(*v as i64),
            Self::String(s) => s
                .parse()
                .map_err(|_| Error::InvalidValue(format!("cannot coerce '{s}' to LONG"))),
            other => Err(Error::InvalidValue(format!(
                "cannot coerce {} to LONG",
                other.property_type()
            ))),
        }
    }

    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            Self::Boolean(v) => Ok(*v),
            other => Err(Error::InvalidValue(format!(
                "cannot coerce {} to BOOLEAN",
                other.property_type()
            ))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::String(v) | Self::Uri(v) | Self::Decimal(v) => Ok(v),
            other => Err(Error::InvalidValue(format!(
                "cannot coerce {} to STRING",
                other.property_type()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) | Self::Uri(v) | Self::Decimal(v) => write!(f, "{v}"),
            Self::Binary(v) => write!(f, "<binary:{} bytes>", v.len()),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Name(v) => write!(f, "{v}"),
            Self::Path(v) => write!(f, "{v}"),
            Self::Reference(v) | Self::WeakReference(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
