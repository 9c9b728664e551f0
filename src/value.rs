use serde::ser::{self, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::codec::Decoder;

/// A value to be written into a map.
///
/// Integer variants carry the widest supported type; the encoder always picks
/// the narrowest wire form that holds the actual value, so `Uint(100)` and
/// `Uint(100_000)` produce one and five bytes respectively.
///
/// # Example
/// ```
/// use msgpack_map::{Value, to_vec};
///
/// assert_eq!(to_vec(&Value::Uint(100)).unwrap(), [0x64]);
/// assert_eq!(to_vec(&Value::Int(-33)).unwrap(), [0xd0, 0xdf]);
/// assert_eq!(to_vec(&Value::from("hi")).unwrap(), [0xa2, b'h', b'i']);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// Nil value
    Nil,
    /// Boolean value
    Bool(bool),
    /// Unsigned integer (up to 32 bits)
    Uint(u32),
    /// Signed integer (up to 32 bits)
    Int(i32),
    /// IEEE-754 single precision float
    Float(f32),
    /// UTF-8 text, at most 255 bytes
    Str(&'a str),
    /// Opaque bytes, at most 255
    Bytes(&'a [u8]),
    /// Homogeneous array
    Array(Array<'a>),
}

/// A homogeneous array of one integer width or of floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Array<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
    I8(&'a [i8]),
    I16(&'a [i16]),
    I32(&'a [i32]),
    F32(&'a [f32]),
}

impl<'a> Array<'a> {
    pub fn len(&self) -> usize {
        match self {
            Array::U8(a) => a.len(),
            Array::U16(a) => a.len(),
            Array::U32(a) => a.len(),
            Array::I8(a) => a.len(),
            Array::I16(a) => a.len(),
            Array::I32(a) => a.len(),
            Array::F32(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns element `index` as a scalar value
    pub fn get(&self, index: usize) -> Option<Value<'a>> {
        match self {
            Array::U8(a) => a.get(index).map(|&v| Value::from(v)),
            Array::U16(a) => a.get(index).map(|&v| Value::from(v)),
            Array::U32(a) => a.get(index).map(|&v| Value::from(v)),
            Array::I8(a) => a.get(index).map(|&v| Value::from(v)),
            Array::I16(a) => a.get(index).map(|&v| Value::from(v)),
            Array::I32(a) => a.get(index).map(|&v| Value::from(v)),
            Array::F32(a) => a.get(index).map(|&v| Value::from(v)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value<'a>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value<'_> {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    u8 => Uint,
    u16 => Uint,
    u32 => Uint,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    f32 => Float,
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(v: &'a str) -> Self {
        Value::Str(v)
    }
}

impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(v: &'a [u8]) -> Self {
        Value::Bytes(v)
    }
}

impl<'a> From<Array<'a>> for Value<'a> {
    fn from(v: Array<'a>) -> Self {
        Value::Array(v)
    }
}

macro_rules! array_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> From<&'a [$ty]> for Array<'a> {
                fn from(v: &'a [$ty]) -> Self {
                    Array::$variant(v)
                }
            }
        )*
    };
}

// `&[u8]` converts to `Value::Bytes`; u8 arrays are built with `Array::U8`.
array_from! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    f32 => F32,
}

impl Value<'_> {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::Uint(_) => ValueKind::Uint,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Array(_) => ValueKind::Array,
        }
    }
}

impl Serialize for Value<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Nil => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Uint(v) => serializer.serialize_u32(*v),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serde_bytes::Bytes::new(b).serialize(serializer),
            Value::Array(a) => serializer.collect_seq(a.iter()),
        }
    }
}

/// Broad category of an encoded value, used in error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Nil,
    Bool,
    Uint,
    Int,
    Float,
    Str,
    Bytes,
    Array,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Nil => "nil",
            ValueKind::Bool => "bool",
            ValueKind::Uint => "unsigned integer",
            ValueKind::Int => "signed integer",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Array => "array",
            ValueKind::Map => "map",
        })
    }
}

/// A value decoded in place, borrowing from the serialized bytes.
///
/// Arrays and maps are not materialized; [`ArrayView`] and [`MapView`]
/// decode their elements lazily from the same buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Nil,
    Bool(bool),
    Uint(u32),
    Int(i32),
    Float(f32),
    Str(&'a str),
    Bytes(&'a [u8]),
    Array(ArrayView<'a>),
    Map(MapView<'a>),
}

impl<'a> ValueRef<'a> {
    pub fn kind(&self) -> ValueKind {
        match self {
            ValueRef::Nil => ValueKind::Nil,
            ValueRef::Bool(_) => ValueKind::Bool,
            ValueRef::Uint(_) => ValueKind::Uint,
            ValueRef::Int(_) => ValueKind::Int,
            ValueRef::Float(_) => ValueKind::Float,
            ValueRef::Str(_) => ValueKind::Str,
            ValueRef::Bytes(_) => ValueKind::Bytes,
            ValueRef::Array(_) => ValueKind::Array,
            ValueRef::Map(_) => ValueKind::Map,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ValueRef::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ValueRef::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer if it is a non-negative integer
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            ValueRef::Uint(v) => Some(v),
            ValueRef::Int(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }

    /// Returns the value as a signed integer if it fits in an `i32`
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            ValueRef::Int(v) => Some(v),
            ValueRef::Uint(v) => i32::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ValueRef::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            ValueRef::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            ValueRef::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<ArrayView<'a>> {
        match self {
            ValueRef::Array(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<MapView<'a>> {
        match self {
            ValueRef::Map(m) => Some(*m),
            _ => None,
        }
    }
}

impl Serialize for ValueRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ValueRef::Nil => serializer.serialize_none(),
            ValueRef::Bool(b) => serializer.serialize_bool(*b),
            ValueRef::Uint(v) => serializer.serialize_u32(*v),
            ValueRef::Int(v) => serializer.serialize_i32(*v),
            ValueRef::Float(v) => serializer.serialize_f32(*v),
            ValueRef::Str(s) => serializer.serialize_str(s),
            ValueRef::Bytes(b) => serde_bytes::Bytes::new(b).serialize(serializer),
            ValueRef::Array(a) => a.serialize(serializer),
            ValueRef::Map(m) => m.serialize(serializer),
        }
    }
}

/// Array elements still in their encoded form.
///
/// Created by the decoder after it has checked that all `len` elements are
/// well formed; `start` is the absolute offset of the first element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayView<'a> {
    buf: &'a [u8],
    start: usize,
    len: u16,
}

impl<'a> ArrayView<'a> {
    pub(crate) fn new(buf: &'a [u8], start: usize, len: u16) -> Self {
        ArrayView { buf, start, len }
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the first element in the underlying buffer
    pub fn offset(&self) -> usize {
        self.start
    }

    pub fn iter(&self) -> ArrayIter<'a> {
        ArrayIter {
            decoder: Decoder::at(self.buf, self.start),
            remaining: self.len,
        }
    }
}

impl<'a> IntoIterator for ArrayView<'a> {
    type Item = crate::Result<ValueRef<'a>>;
    type IntoIter = ArrayIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ArrayIter<'a> {
    decoder: Decoder<'a>,
    remaining: u16,
}

impl<'a> Iterator for ArrayIter<'a> {
    type Item = crate::Result<ValueRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let item = self.decoder.decode();
        if item.is_err() {
            self.remaining = 0;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(usize::from(self.remaining)))
    }
}

impl Serialize for ArrayView<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for item in self.iter() {
            seq.serialize_element(&item.map_err(ser::Error::custom)?)?;
        }
        seq.end()
    }
}

/// A map (top-level or nested) still in its encoded form.
///
/// Unlike [`MapReader::locate`](crate::MapReader::locate), lookups through a
/// `MapView` only consider the keys of this map, not those of its sub-maps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView<'a> {
    buf: &'a [u8],
    start: usize,
    len: u16,
}

impl<'a> MapView<'a> {
    pub(crate) fn new(buf: &'a [u8], start: usize, len: u16) -> Self {
        MapView { buf, start, len }
    }

    /// Number of key/value entries
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the first key in the underlying buffer
    pub fn offset(&self) -> usize {
        self.start
    }

    pub fn iter(&self) -> MapIter<'a> {
        MapIter {
            decoder: Decoder::at(self.buf, self.start),
            remaining: self.len,
        }
    }

    /// Looks up `key` among this map's own entries
    pub fn get(&self, key: &str) -> crate::Result<Option<ValueRef<'a>>> {
        for entry in self.iter() {
            let (k, v) = entry?;
            if k == key {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }
}

impl<'a> IntoIterator for MapView<'a> {
    type Item = crate::Result<(&'a str, ValueRef<'a>)>;
    type IntoIter = MapIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct MapIter<'a> {
    decoder: Decoder<'a>,
    remaining: u16,
}

impl<'a> MapIter<'a> {
    fn next_entry(&mut self) -> crate::Result<(&'a str, ValueRef<'a>)> {
        let offset = self.decoder.position();
        let key = self
            .decoder
            .decode()?
            .as_str()
            .ok_or(crate::Error::MalformedData {
                offset,
                reason: "map key is not a string",
            })?;
        let value = self.decoder.decode()?;
        Ok((key, value))
    }
}

impl<'a> Iterator for MapIter<'a> {
    type Item = crate::Result<(&'a str, ValueRef<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let entry = self.next_entry();
        if entry.is_err() {
            self.remaining = 0;
        }
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(usize::from(self.remaining)))
    }
}

impl Serialize for MapView<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for entry in self.iter() {
            let (key, value) = entry.map_err(ser::Error::custom)?;
            map.serialize_entry(key, &value)?;
        }
        map.end()
    }
}
