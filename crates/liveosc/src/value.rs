//! OSC argument values as LiveOSC uses them.

use std::fmt;

use rosc::OscType;

/// One OSC argument.
///
/// LiveOSC only ever sends ints, floats, strings and the odd nil, so this
/// keeps the rest of the crate away from the full `rosc` type zoo.
#[derive(Debug, Clone, PartialEq)]
pub enum OscValue {
    Int(i32),
    Float(f32),
    Double(f64),
    Str(String),
    Bool(bool),
    Nil,
}

impl OscValue {
    /// Numeric view. Live is loose about int vs float, so both convert.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OscValue::Int(v) => Some(*v as f32),
            OscValue::Float(v) => Some(*v),
            OscValue::Double(v) => Some(*v as f32),
            OscValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OscValue::Double(v) => Some(*v),
            other => other.as_f32().map(f64::from),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            OscValue::Int(v) => Some(*v),
            OscValue::Float(v) if v.fract() == 0.0 => Some(*v as i32),
            OscValue::Double(v) if v.fract() == 0.0 => Some(*v as i32),
            OscValue::Bool(v) => Some(i32::from(*v)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OscValue::Bool(v) => Some(*v),
            other => other.as_i32().map(|v| v != 0),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, OscValue::Nil)
    }

    /// Parse a console token: int, then float, then `true`/`false`, else string.
    pub fn parse_token(token: &str) -> Self {
        if let Ok(v) = token.parse::<i32>() {
            OscValue::Int(v)
        } else if let Ok(v) = token.parse::<f32>() {
            OscValue::Float(v)
        } else {
            match token {
                "true" => OscValue::Bool(true),
                "false" => OscValue::Bool(false),
                "nil" => OscValue::Nil,
                _ => OscValue::Str(token.to_string()),
            }
        }
    }
}

impl fmt::Display for OscValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscValue::Int(v) => write!(f, "{}", v),
            OscValue::Float(v) => write!(f, "{}", v),
            OscValue::Double(v) => write!(f, "{}", v),
            OscValue::Str(s) => write!(f, "{:?}", s),
            OscValue::Bool(v) => write!(f, "{}", v),
            OscValue::Nil => write!(f, "nil"),
        }
    }
}

impl From<i32> for OscValue {
    fn from(v: i32) -> Self {
        OscValue::Int(v)
    }
}

impl From<f32> for OscValue {
    fn from(v: f32) -> Self {
        OscValue::Float(v)
    }
}

impl From<bool> for OscValue {
    fn from(v: bool) -> Self {
        OscValue::Bool(v)
    }
}

impl From<&str> for OscValue {
    fn from(v: &str) -> Self {
        OscValue::Str(v.to_string())
    }
}

impl From<String> for OscValue {
    fn from(v: String) -> Self {
        OscValue::Str(v)
    }
}

/// Entity indices go out as OSC int32.
impl From<usize> for OscValue {
    fn from(v: usize) -> Self {
        OscValue::Int(i32::try_from(v).unwrap_or(i32::MAX))
    }
}

impl From<OscValue> for OscType {
    fn from(v: OscValue) -> Self {
        match v {
            OscValue::Int(i) => OscType::Int(i),
            OscValue::Float(x) => OscType::Float(x),
            OscValue::Double(x) => OscType::Double(x),
            OscValue::Str(s) => OscType::String(s),
            OscValue::Bool(b) => OscType::Bool(b),
            OscValue::Nil => OscType::Nil,
        }
    }
}

impl From<OscType> for OscValue {
    fn from(v: OscType) -> Self {
        match v {
            OscType::Int(i) => OscValue::Int(i),
            OscType::Long(i) => i32::try_from(i)
                .map(OscValue::Int)
                .unwrap_or(OscValue::Double(i as f64)),
            OscType::Float(x) => OscValue::Float(x),
            OscType::Double(x) => OscValue::Double(x),
            OscType::String(s) => OscValue::Str(s),
            OscType::Char(c) => OscValue::Str(c.to_string()),
            OscType::Bool(b) => OscValue::Bool(b),
            _ => OscValue::Nil,
        }
    }
}

/// Build an argument list from mixed literal types.
#[macro_export]
macro_rules! osc_args {
    () => { Vec::<$crate::OscValue>::new() };
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::OscValue::from($arg)),+]
    };
}
