//! Flat wire values and records.

use crate::error::{CodecError, CodecResult};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A scalar field value in a wire record.
///
/// Wire records are flat; arrays and nested maps are intentionally not
/// representable because no remote store schema in this system needs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Explicit null (a present-but-empty field).
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point value (measured amounts).
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// An entity identifier.
    Id(Uuid),
    /// A point in time.
    Timestamp(Timestamp),
}

impl FieldValue {
    /// Returns the value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an integer, if it is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a float. Integers widen losslessly enough for
    /// logged amounts.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            FieldValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the value as text, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an id, if it is one.
    #[must_use]
    pub fn as_id(&self) -> Option<Uuid> {
        match self {
            FieldValue::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the value as a timestamp, if it is one.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Returns true if the value is [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        FieldValue::Id(v)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(v: Timestamp) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// A flat record keyed by string field name.
///
/// `WireRecord` is the common currency between the typed entities, the
/// durable queue (as a payload snapshot), and the remote record mapper.
/// Fields are kept sorted by name so that encodings are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl WireRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets an optional field; `None` leaves the field absent.
    pub fn set_opt(
        &mut self,
        name: impl Into<String>,
        value: Option<impl Into<FieldValue>>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.fields.insert(name.into(), value.into());
        }
        self
    }

    /// Returns a field value, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a required field.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingField`] when the field is absent.
    pub fn require(&self, name: &str) -> CodecResult<&FieldValue> {
        self.get(name).ok_or_else(|| CodecError::missing_field(name))
    }

    /// Returns a required id field.
    ///
    /// # Errors
    ///
    /// [`CodecError::MissingField`] if absent, [`CodecError::WrongType`] if
    /// the field is not an id.
    pub fn require_id(&self, name: &str) -> CodecResult<Uuid> {
        self.require(name)?
            .as_id()
            .ok_or_else(|| CodecError::wrong_type(name, "id"))
    }

    /// Returns a required text field.
    ///
    /// # Errors
    ///
    /// [`CodecError::MissingField`] if absent, [`CodecError::WrongType`] if
    /// the field is not text.
    pub fn require_text(&self, name: &str) -> CodecResult<&str> {
        self.require(name)?
            .as_text()
            .ok_or_else(|| CodecError::wrong_type(name, "text"))
    }

    /// Returns a required timestamp field.
    ///
    /// # Errors
    ///
    /// [`CodecError::MissingField`] if absent, [`CodecError::WrongType`] if
    /// the field is not a timestamp.
    pub fn require_timestamp(&self, name: &str) -> CodecResult<Timestamp> {
        self.require(name)?
            .as_timestamp()
            .ok_or_else(|| CodecError::wrong_type(name, "timestamp"))
    }

    /// Returns a required bool field.
    ///
    /// # Errors
    ///
    /// [`CodecError::MissingField`] if absent, [`CodecError::WrongType`] if
    /// the field is not a bool.
    pub fn require_bool(&self, name: &str) -> CodecResult<bool> {
        self.require(name)?
            .as_bool()
            .ok_or_else(|| CodecError::wrong_type(name, "bool"))
    }

    /// Returns an optional text field as an owned string.
    #[must_use]
    pub fn text_opt(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|v| v.as_text()).map(str::to_string)
    }

    /// Returns an optional float field.
    #[must_use]
    pub fn float_opt(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_float)
    }

    /// Returns an optional timestamp field.
    #[must_use]
    pub fn timestamp_opt(&self, name: &str) -> Option<Timestamp> {
        self.get(name).and_then(FieldValue::as_timestamp)
    }
}

impl FromIterator<(String, FieldValue)> for WireRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
