//! Tagged values — the in-memory interchange type for scalar fields.

use std::cmp::Ordering;

use crate::schema::{Field, FieldType};

/// A scalar field value.
///
/// Enum and bitmask fields are stored as [`Value::Unsigned`]; their
/// symbolic form only exists on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Signed integer (width-checked against the field descriptor).
    Signed(i64),
    /// Unsigned integer (width-checked against the field descriptor).
    Unsigned(u64),
    /// Floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// The zero value for `field`.
    #[must_use]
    pub fn default_for(field: &Field) -> Self {
        match field.kind {
            FieldType::Bool => Self::Bool(false),
            FieldType::Signed => Self::Signed(0),
            FieldType::Float => Self::Float(0.0),
            FieldType::String => Self::String(String::new()),
            FieldType::Bytes => Self::Bytes(Vec::new()),
            FieldType::Unsigned
            | FieldType::Enum
            | FieldType::Bitmask
            | FieldType::Object
            | FieldType::Null => Self::Unsigned(0),
        }
    }

    /// True when the value matches the field's semantic type.
    #[must_use]
    pub fn matches(&self, field: &Field) -> bool {
        matches!(
            (self, field.kind),
            (Self::Bool(_), FieldType::Bool)
                | (Self::Signed(_), FieldType::Signed)
                | (
                    Self::Unsigned(_),
                    FieldType::Unsigned | FieldType::Enum | FieldType::Bitmask | FieldType::Null
                )
                | (Self::Float(_), FieldType::Float)
                | (Self::String(_), FieldType::String)
                | (Self::Bytes(_), FieldType::Bytes)
        )
    }

    /// True when an integer value fits in `width` bytes; always true for
    /// the non-integer variants.
    #[must_use]
    pub fn fits_width(&self, width: usize) -> bool {
        match self {
            Self::Signed(v) => match width {
                1 => i8::try_from(*v).is_ok(),
                2 => i16::try_from(*v).is_ok(),
                4 => i32::try_from(*v).is_ok(),
                _ => true,
            },
            Self::Unsigned(v) => match width {
                1 => u8::try_from(*v).is_ok(),
                2 => u16::try_from(*v).is_ok(),
                4 => u32::try_from(*v).is_ok(),
                _ => true,
            },
            _ => true,
        }
    }

    /// Numeric view as `u64`, if the variant is numeric.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Bool(b) => Some(u64::from(*b)),
            Self::Signed(v) => u64::try_from(*v).ok(),
            Self::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view as `i64`, if the variant is numeric.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Signed(v) => Some(*v),
            Self::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Numeric view as `f64`, if the variant is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Signed(v) => Some(*v as f64),
            Self::Unsigned(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String view, for string values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Bytes view, for bytes values.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Signed(_) => 1,
            Self::Unsigned(_) => 2,
            Self::Float(_) => 3,
            Self::String(_) => 4,
            Self::Bytes(_) => 5,
        }
    }

    /// Deterministic ordering across all variants.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Signed(a), Self::Signed(b)) => a.cmp(b),
            (Self::Unsigned(a), Self::Unsigned(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Signed(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Unsigned(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_checks() {
        assert!(Value::Signed(127).fits_width(1));
        assert!(!Value::Signed(128).fits_width(1));
        assert!(Value::Signed(-128).fits_width(1));
        assert!(!Value::Signed(-129).fits_width(1));
        assert!(Value::Unsigned(65_535).fits_width(2));
        assert!(!Value::Unsigned(65_536).fits_width(2));
        assert!(Value::Unsigned(u64::MAX).fits_width(8));
        assert!(Value::String("anything".into()).fits_width(1));
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Value::Bool(true).as_u64(), Some(1));
        assert_eq!(Value::Signed(-1).as_u64(), None);
        assert_eq!(Value::Unsigned(7).as_i64(), Some(7));
        assert_eq!(Value::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::String("x".into()).as_u64(), None);
    }

    #[test]
    fn ordering_is_total() {
        assert_eq!(Value::Signed(1).compare(&Value::Signed(2)), Ordering::Less);
        assert_eq!(
            Value::Float(f64::NAN).compare(&Value::Float(f64::NAN)),
            Ordering::Equal
        );
        assert_eq!(
            Value::Bool(true).compare(&Value::String("a".into())),
            Ordering::Less
        );
    }
}
