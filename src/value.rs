//! Tagged runtime value and its total coercions

use crate::object::{HeapObject, ObjectRef};

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Immutable byte string.
///
/// Scripted strings carry arbitrary bytes; display is lossy UTF-8. Cloning
/// shares the buffer, and equality is by content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LuaStr(Rc<[u8]>);

impl LuaStr {
    /// Raw bytes of the string.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Flag whether the string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for LuaStr {
    fn default() -> Self {
        Self(Rc::from(&[][..]))
    }
}

impl Deref for LuaStr {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for LuaStr {
    fn from(bytes: &[u8]) -> Self {
        Self(Rc::from(bytes))
    }
}

impl From<Vec<u8>> for LuaStr {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Rc::from(bytes))
    }
}

impl From<&str> for LuaStr {
    fn from(text: &str) -> Self {
        Self(Rc::from(text.as_bytes()))
    }
}

impl From<String> for LuaStr {
    fn from(text: String) -> Self {
        text.into_bytes().into()
    }
}

impl fmt::Display for LuaStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        String::from_utf8_lossy(&self.0).fmt(f)
    }
}

/// Type tag surfaced to scripts and the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    /// The absent value.
    Nil,
    /// `true` or `false`.
    Boolean,
    /// Integer or floating number.
    Number,
    /// Byte string.
    String,
    /// Key-value table.
    Table,
    /// Script or native closure.
    Function,
    /// Opaque host handle.
    Userdata,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nil => "nil",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Table => "table",
            Self::Function => "function",
            Self::Userdata => "userdata",
        };

        f.write_str(name)
    }
}

/// Numeric payload of a successful arithmetic coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    /// Exact integer.
    Int(i64),
    /// IEEE-754 double.
    Float(f64),
}

/// Tagged runtime value.
///
/// Copying a value clones its payload; for object references the clone bumps
/// the referenced object's refcount.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Nil,
    /// A boolean.
    Boolean(bool),
    /// A platform-sized signed integer.
    Integer(i64),
    /// An IEEE-754 double.
    Number(f64),
    /// An immutable byte string.
    String(LuaStr),
    /// A ref-counted handle into the object store.
    Object(ObjectRef),
    /// An opaque host handle.
    Userdata(usize),
}

impl Value {
    /// Type tag of this value, resolving object handles to their stored
    /// variant.
    pub fn tag(&self) -> Type {
        match self {
            Self::Nil => Type::Nil,
            Self::Boolean(_) => Type::Boolean,
            Self::Integer(_) | Self::Number(_) => Type::Number,
            Self::String(_) => Type::String,
            Self::Userdata(_) => Type::Userdata,
            Self::Object(handle) => match &*handle.borrow() {
                HeapObject::Table(_) => Type::Table,
                HeapObject::Closure(_) | HeapObject::Native(_) => Type::Function,
            },
        }
    }

    /// Flag whether the value counts as true in conditions. Only `nil` and
    /// `false` don't.
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Boolean(false))
    }

    /// Flag whether the value is `nil`.
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Coerce to a numeric payload for arithmetic: numbers pass through,
    /// numeric-parseable strings convert, everything else fails.
    pub fn to_numeric(&self) -> Option<Numeric> {
        match self {
            Self::Integer(i) => Some(Numeric::Int(*i)),
            Self::Number(n) => Some(Numeric::Float(*n)),
            Self::String(s) => parse_numeric(s.as_bytes()),
            _ => None,
        }
    }

    /// Coerce to a float: numbers widen, numeric-parseable strings convert.
    pub fn to_float(&self) -> Option<f64> {
        self.to_numeric().map(|n| match n {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        })
    }

    /// Coerce to an integer, rejecting values that aren't exactly
    /// representable.
    pub fn to_integer(&self) -> Option<i64> {
        self.to_numeric().and_then(|n| match n {
            Numeric::Int(i) => Some(i),
            Numeric::Float(f) => float_to_int_exact(f),
        })
    }

    /// Coerce to a string for concatenation: strings pass through, numbers
    /// render, everything else fails.
    pub fn to_lua_string(&self) -> Option<LuaStr> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string().into()),
            Self::Number(n) => Some(float_to_string(*n).into()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Integer(i), Self::Number(f)) | (Self::Number(f), Self::Integer(i)) => {
                int_eq_float(*i, *f)
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Userdata(a), Self::Userdata(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<LuaStr> for Value {
    fn from(s: LuaStr) -> Self {
        Self::String(s)
    }
}

/// Integer-against-float equality by exact value.
pub(crate) fn int_eq_float(i: i64, f: f64) -> bool {
    float_to_int_exact(f) == Some(i)
}

/// Convert a float to an integer only when the value is exactly
/// representable.
pub(crate) fn float_to_int_exact(f: f64) -> Option<i64> {
    (f.floor() == f && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0)
        .then(|| f as i64)
}

/// Render a float the way scripts observe it: shortest form, with `.0`
/// appended when nothing marks it as non-integral.
pub(crate) fn float_to_string(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }

    if f.is_infinite() {
        return if f.is_sign_positive() { "inf" } else { "-inf" }.to_owned();
    }

    let rendered = format!("{f}");

    if rendered.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        format!("{rendered}.0")
    } else {
        rendered
    }
}

/// Parse a byte string as a number: optional sign, hexadecimal or decimal
/// integer, or decimal float. Hexadecimal integers wrap like integer
/// arithmetic does.
fn parse_numeric(bytes: &[u8]) -> Option<Numeric> {
    let text = std::str::from_utf8(bytes).ok()?.trim();

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let magnitude = u64::from_str_radix(hex, 16).ok()? as i64;

        return Some(Numeric::Int(if negative {
            magnitude.wrapping_neg()
        } else {
            magnitude
        }));
    }

    if let Ok(i) = text.parse::<i64>() {
        return Some(Numeric::Int(i));
    }

    text.parse::<f64>().ok().map(Numeric::Float)
}
