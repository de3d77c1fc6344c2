use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::NanonisError;

/// Wire type of a single argument or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    I16,
    I32,
    U16,
    U32,
    F32,
    F64,
    /// Byte string with a u32 length prefix
    String,
    /// Elements of the inner type behind a u32 count prefix
    Array(Box<TypeTag>),
    /// Elements without prefix, count taken from the preceding integer value
    Counted(Box<TypeTag>),
    /// String bytes without prefix, length taken from the preceding integer value
    CountedString,
}

impl TypeTag {
    pub fn array(inner: TypeTag) -> Self {
        TypeTag::Array(Box::new(inner))
    }

    pub fn counted(inner: TypeTag) -> Self {
        TypeTag::Counted(Box::new(inner))
    }

    /// Encoded width for fixed-width numeric types
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            TypeTag::I16 | TypeTag::U16 => Some(2),
            TypeTag::I32 | TypeTag::U32 | TypeTag::F32 => Some(4),
            TypeTag::F64 => Some(8),
            _ => None,
        }
    }

    /// Smallest number of bytes any value of this type can occupy.
    pub fn min_encoded_len(&self) -> usize {
        match self {
            TypeTag::String | TypeTag::Array(_) => 4,
            TypeTag::Counted(_) | TypeTag::CountedString => 0,
            fixed => fixed.fixed_width().unwrap_or(0),
        }
    }

    /// Whether the element count of this type comes from the previous value
    pub fn is_counted(&self) -> bool {
        matches!(self, TypeTag::Counted(_) | TypeTag::CountedString)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeTag::I16 | TypeTag::I32 | TypeTag::U16 | TypeTag::U32
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.fixed_width().is_some()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::I16 => write!(f, "h"),
            TypeTag::I32 => write!(f, "i"),
            TypeTag::U16 => write!(f, "H"),
            TypeTag::U32 => write!(f, "I"),
            TypeTag::F32 => write!(f, "f"),
            TypeTag::F64 => write!(f, "d"),
            TypeTag::String => write!(f, "+*c"),
            TypeTag::CountedString => write!(f, "*-c"),
            TypeTag::Array(inner) => write!(f, "+*{inner}"),
            TypeTag::Counted(inner) if **inner == TypeTag::String => write!(f, "*+c"),
            TypeTag::Counted(inner) => write!(f, "*{inner}"),
        }
    }
}

/// Parses the compact notation of the Nanonis TCP documentation,
/// e.g. `"f"`, `"+*i"`, `"*-c"` or `"+*+*d"`.
impl FromStr for TypeTag {
    type Err = NanonisError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let tag = match code.trim() {
            "h" => TypeTag::I16,
            "i" => TypeTag::I32,
            "H" => TypeTag::U16,
            "I" => TypeTag::U32,
            "f" => TypeTag::F32,
            "d" => TypeTag::F64,
            "+*c" => TypeTag::String,
            "*-c" => TypeTag::CountedString,
            "*+c" => TypeTag::counted(TypeTag::String),
            t if t.starts_with("+*") => TypeTag::array(t[2..].parse()?),
            t if t.starts_with('*') => {
                let inner: TypeTag = t[1..].parse()?;
                if inner.is_counted() {
                    return Err(NanonisError::Type(format!(
                        "Nested count-from-previous type: {code}"
                    )));
                }
                TypeTag::counted(inner)
            }
            _ => {
                return Err(NanonisError::Type(format!(
                    "Unsupported type code: {code}"
                )))
            }
        };

        if let TypeTag::Array(inner) = &tag {
            if inner.is_counted() {
                return Err(NanonisError::Type(format!(
                    "Count-from-previous type inside prefixed array: {code}"
                )));
            }
        }
        Ok(tag)
    }
}

/// Parse a list of compact type codes
pub fn parse_type_codes(codes: &[&str]) -> Result<Vec<TypeTag>, NanonisError> {
    codes.iter().map(|c| c.parse()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NanonisValue {
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    F64(f64),
    String(String),
    Array(Vec<NanonisValue>),
}

/// Tip position in the XY plane, in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A value paired with the wire type it is sent as.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub tag: TypeTag,
    pub value: NanonisValue,
}

impl TypedValue {
    pub fn new(tag: TypeTag, value: impl Into<NanonisValue>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }
}

// Conversion traits for NanonisValue
impl From<f32> for NanonisValue {
    fn from(value: f32) -> Self {
        NanonisValue::F32(value)
    }
}

impl From<f64> for NanonisValue {
    fn from(value: f64) -> Self {
        NanonisValue::F64(value)
    }
}

impl From<u16> for NanonisValue {
    fn from(value: u16) -> Self {
        NanonisValue::U16(value)
    }
}

impl From<u32> for NanonisValue {
    fn from(value: u32) -> Self {
        NanonisValue::U32(value)
    }
}

impl From<i16> for NanonisValue {
    fn from(value: i16) -> Self {
        NanonisValue::I16(value)
    }
}

impl From<i32> for NanonisValue {
    fn from(value: i32) -> Self {
        NanonisValue::I32(value)
    }
}

impl From<String> for NanonisValue {
    fn from(value: String) -> Self {
        NanonisValue::String(value)
    }
}

impl From<&str> for NanonisValue {
    fn from(value: &str) -> Self {
        NanonisValue::String(value.to_string())
    }
}

impl<T: Into<NanonisValue>> From<Vec<T>> for NanonisValue {
    fn from(value: Vec<T>) -> Self {
        NanonisValue::Array(value.into_iter().map(Into::into).collect())
    }
}

macro_rules! impl_try_from_scalar {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl TryFrom<NanonisValue> for $ty {
            type Error = NanonisError;

            fn try_from(value: NanonisValue) -> Result<Self, Self::Error> {
                match value {
                    NanonisValue::$variant(v) => Ok(v),
                    _ => Err(NanonisError::Type(format!(
                        concat!("Expected ", $name, ", got {:?}"),
                        value
                    ))),
                }
            }
        }
    };
}

impl_try_from_scalar!(f32, F32, "f32");
impl_try_from_scalar!(f64, F64, "f64");
impl_try_from_scalar!(u16, U16, "u16");
impl_try_from_scalar!(u32, U32, "u32");
impl_try_from_scalar!(i16, I16, "i16");
impl_try_from_scalar!(i32, I32, "i32");
impl_try_from_scalar!(String, String, "string");

impl<T> TryFrom<NanonisValue> for Vec<T>
where
    T: TryFrom<NanonisValue, Error = NanonisError>,
{
    type Error = NanonisError;

    fn try_from(value: NanonisValue) -> Result<Self, Self::Error> {
        match value {
            NanonisValue::Array(items) => items.into_iter().map(T::try_from).collect(),
            _ => Err(NanonisError::Type(format!("Expected array, got {value:?}"))),
        }
    }
}

impl NanonisValue {
    /// Extract f32 value with type checking
    pub fn as_f32(&self) -> Result<f32, NanonisError> {
        match self {
            NanonisValue::F32(v) => Ok(*v),
            _ => Err(NanonisError::Type(format!("Expected f32, got {self:?}"))),
        }
    }

    /// Extract f64 value with type checking
    pub fn as_f64(&self) -> Result<f64, NanonisError> {
        match self {
            NanonisValue::F64(v) => Ok(*v),
            _ => Err(NanonisError::Type(format!("Expected f64, got {self:?}"))),
        }
    }

    pub fn as_u16(&self) -> Result<u16, NanonisError> {
        match self {
            NanonisValue::U16(v) => Ok(*v),
            _ => Err(NanonisError::Type(format!("Expected u16, got {self:?}"))),
        }
    }

    pub fn as_u32(&self) -> Result<u32, NanonisError> {
        match self {
            NanonisValue::U32(v) => Ok(*v),
            _ => Err(NanonisError::Type(format!("Expected u32, got {self:?}"))),
        }
    }

    pub fn as_i32(&self) -> Result<i32, NanonisError> {
        match self {
            NanonisValue::I32(v) => Ok(*v),
            _ => Err(NanonisError::Type(format!("Expected i32, got {self:?}"))),
        }
    }

    pub fn as_string(&self) -> Result<&str, NanonisError> {
        match self {
            NanonisValue::String(s) => Ok(s),
            _ => Err(NanonisError::Type(format!("Expected string, got {self:?}"))),
        }
    }

    pub fn as_array(&self) -> Result<&[NanonisValue], NanonisError> {
        match self {
            NanonisValue::Array(items) => Ok(items),
            _ => Err(NanonisError::Type(format!("Expected array, got {self:?}"))),
        }
    }

    /// Interpret an integer value as an element count or byte length.
    pub fn as_count(&self) -> Option<usize> {
        match self {
            NanonisValue::U16(v) => Some(*v as usize),
            NanonisValue::U32(v) => Some(*v as usize),
            NanonisValue::I16(v) => usize::try_from(*v).ok(),
            NanonisValue::I32(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Check that the runtime shape of this value fits the wire type.
    pub fn matches(&self, tag: &TypeTag) -> bool {
        match (self, tag) {
            (NanonisValue::I16(_), TypeTag::I16)
            | (NanonisValue::I32(_), TypeTag::I32)
            | (NanonisValue::U16(_), TypeTag::U16)
            | (NanonisValue::U32(_), TypeTag::U32)
            | (NanonisValue::F32(_), TypeTag::F32)
            | (NanonisValue::F64(_), TypeTag::F64)
            | (NanonisValue::String(_), TypeTag::String)
            | (NanonisValue::String(_), TypeTag::CountedString) => true,
            (NanonisValue::Array(items), TypeTag::Array(inner))
            | (NanonisValue::Array(items), TypeTag::Counted(inner)) => {
                items.iter().all(|item| item.matches(inner))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_parse() {
        assert_eq!("f".parse::<TypeTag>().unwrap(), TypeTag::F32);
        assert_eq!("H".parse::<TypeTag>().unwrap(), TypeTag::U16);
        assert_eq!("+*c".parse::<TypeTag>().unwrap(), TypeTag::String);
        assert_eq!(
            "+*i".parse::<TypeTag>().unwrap(),
            TypeTag::array(TypeTag::I32)
        );
        assert_eq!(
            "+*+*d".parse::<TypeTag>().unwrap(),
            TypeTag::array(TypeTag::array(TypeTag::F64))
        );
        assert_eq!(
            "*f".parse::<TypeTag>().unwrap(),
            TypeTag::counted(TypeTag::F32)
        );
        assert_eq!(
            "*+c".parse::<TypeTag>().unwrap(),
            TypeTag::counted(TypeTag::String)
        );
        assert_eq!("*-c".parse::<TypeTag>().unwrap(), TypeTag::CountedString);
    }

    #[test]
    fn test_invalid_type_codes() {
        assert!("x".parse::<TypeTag>().is_err());
        assert!("+*".parse::<TypeTag>().is_err());
        assert!("+**f".parse::<TypeTag>().is_err());
        assert!("**f".parse::<TypeTag>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for code in ["h", "i", "H", "I", "f", "d", "+*c", "*-c", "+*+*f", "*d", "*+c"] {
            let tag: TypeTag = code.parse().unwrap();
            assert_eq!(tag.to_string(), code);
        }
    }

    #[test]
    fn test_value_matches_tag() {
        assert!(NanonisValue::F32(1.0).matches(&TypeTag::F32));
        assert!(!NanonisValue::F32(1.0).matches(&TypeTag::F64));
        let nested: NanonisValue = vec![vec![1.0f32], vec![]].into();
        assert!(nested.matches(&TypeTag::array(TypeTag::array(TypeTag::F32))));
        assert!(!nested.matches(&TypeTag::array(TypeTag::F32)));
        assert!(NanonisValue::Array(vec![]).matches(&TypeTag::array(TypeTag::I16)));
    }

    #[test]
    fn test_conversions() {
        let v: NanonisValue = vec![1i32, 2, 3].into();
        let back: Vec<i32> = v.try_into().unwrap();
        assert_eq!(back, vec![1, 2, 3]);

        let err = f32::try_from(NanonisValue::U32(1));
        assert!(matches!(err, Err(NanonisError::Type(_))));
        assert_eq!(NanonisValue::I32(-1).as_count(), None);
        assert_eq!(NanonisValue::U16(7).as_count(), Some(7));
    }
}
