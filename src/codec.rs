//! Minimal-width MessagePack encoding and bounds-checked decoding of single values.

use std::io::Write;

use crate::error::{Error, Result};
use crate::options::Options;
use crate::value::{Array, ArrayView, MapView, Value, ValueKind, ValueRef};
use crate::MAX_SUBMAPS;

// MessagePack markers
pub(crate) const POSITIVE_FIXINT_MAX: u8 = 0x7f;
pub(crate) const FIXMAP: u8 = 0x80;
pub(crate) const FIXARRAY: u8 = 0x90;
pub(crate) const FIXSTR: u8 = 0xa0;
pub(crate) const NIL: u8 = 0xc0;
pub(crate) const FALSE: u8 = 0xc2;
pub(crate) const TRUE: u8 = 0xc3;
pub(crate) const BIN8: u8 = 0xc4;
pub(crate) const FLOAT32: u8 = 0xca;
pub(crate) const UINT8: u8 = 0xcc;
pub(crate) const UINT16: u8 = 0xcd;
pub(crate) const UINT32: u8 = 0xce;
pub(crate) const INT8: u8 = 0xd0;
pub(crate) const INT16: u8 = 0xd1;
pub(crate) const INT32: u8 = 0xd2;
pub(crate) const STR8: u8 = 0xd9;
pub(crate) const ARRAY16: u8 = 0xdc;
pub(crate) const MAP16: u8 = 0xde;
pub(crate) const NEGATIVE_FIXINT: u8 = 0xe0;

// Length limits of the supported forms
pub(crate) const FIXMAP_MAX_LEN: u16 = 15;
pub(crate) const FIXARRAY_MAX_LEN: usize = 15;
pub(crate) const FIXSTR_MAX_LEN: usize = 31;
pub(crate) const STR8_MAX_LEN: usize = 255;
pub(crate) const BIN8_MAX_LEN: usize = 255;
pub(crate) const ARRAY16_MAX_LEN: usize = u16::MAX as usize;

/// Extra bytes a map16 header needs over a fixmap header
pub(crate) const MAP16_GROWTH: usize = 2;

// Sub-maps plus one level of arrays inside the deepest one
const MAX_DECODE_DEPTH: usize = MAX_SUBMAPS + 2;

fn uint_len(v: u32) -> usize {
    match v {
        0..=0x7f => 1,
        0x80..=0xff => 2,
        0x100..=0xffff => 3,
        _ => 5,
    }
}

fn int_len(v: i32) -> usize {
    match v {
        0.. => uint_len(v as u32),
        -32..=-1 => 1,
        -128..=-33 => 2,
        -32768..=-129 => 3,
        _ => 5,
    }
}

pub(crate) fn str_header_len(len: usize) -> Result<usize> {
    if len <= FIXSTR_MAX_LEN {
        Ok(1)
    } else if len <= STR8_MAX_LEN {
        Ok(2)
    } else {
        Err(Error::ValueTooLarge {
            kind: ValueKind::Str,
            len,
            max: STR8_MAX_LEN,
        })
    }
}

fn array_header_len(len: usize) -> Result<usize> {
    if len <= FIXARRAY_MAX_LEN {
        Ok(1)
    } else if len <= ARRAY16_MAX_LEN {
        Ok(3)
    } else {
        Err(Error::ValueTooLarge {
            kind: ValueKind::Array,
            len,
            max: ARRAY16_MAX_LEN,
        })
    }
}

/// Exact number of bytes `value` occupies once encoded with `options`.
///
/// Fails with [`Error::ValueTooLarge`] for values no supported form can hold,
/// so a caller can reject a value before touching its buffer.
pub fn encoded_len(value: &Value, options: &Options) -> Result<usize> {
    Ok(match value {
        Value::Nil | Value::Bool(_) => 1,
        Value::Uint(v) => uint_len(*v),
        Value::Int(v) => int_len(*v),
        Value::Float(_) => 5,
        Value::Str(s) => str_header_len(s.len())? + s.len(),
        Value::Bytes(b) if b.is_empty() && options.omits_empty() => 0,
        Value::Bytes(b) if b.len() > BIN8_MAX_LEN => {
            return Err(Error::ValueTooLarge {
                kind: ValueKind::Bytes,
                len: b.len(),
                max: BIN8_MAX_LEN,
            });
        }
        Value::Bytes(b) => 2 + b.len(),
        Value::Array(a) if a.is_empty() && options.omits_empty() => 0,
        Value::Array(a) => {
            let header = array_header_len(a.len())?;
            a.iter()
                .map(|item| encoded_len(&item, options))
                .sum::<Result<usize>>()?
                + header
        }
    })
}

/// Appends encoded values to any byte sink.
///
/// Writing into a `&mut [u8]` that is too short surfaces as
/// [`Error::Io`]; the map builder sizes every write with [`encoded_len`]
/// first so that never happens there.
pub struct Encoder<W: Write> {
    writer: W,
    options: Options,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self::with_options(writer, Options::default())
    }

    pub fn with_options(writer: W, options: Options) -> Self {
        Encoder { writer, options }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    pub fn encode(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Nil => self.write_nil(),
            Value::Bool(b) => self.write_bool(*b),
            Value::Uint(v) => self.write_uint(*v),
            Value::Int(v) => self.write_int(*v),
            Value::Float(v) => self.write_f32(*v),
            Value::Str(s) => self.write_str(s),
            Value::Bytes(b) => self.write_bytes(b),
            Value::Array(a) => self.write_array(a),
        }
    }

    pub fn write_uint(&mut self, v: u32) -> Result<()> {
        match v {
            0..=0x7f => self.write_all(&[v as u8]),
            0x80..=0xff => self.write_all(&[UINT8, v as u8]),
            0x100..=0xffff => {
                self.write_all(&[UINT16])?;
                self.write_all(&(v as u16).to_be_bytes())
            }
            _ => {
                self.write_all(&[UINT32])?;
                self.write_all(&v.to_be_bytes())
            }
        }
    }

    /// Negative values from -32 down use the one-byte form; -33 is the first
    /// value that needs an int8.
    pub fn write_int(&mut self, v: i32) -> Result<()> {
        match v {
            0.. => self.write_uint(v as u32),
            -32..=-1 => self.write_all(&[v as u8]),
            -128..=-33 => self.write_all(&[INT8, v as u8]),
            -32768..=-129 => {
                self.write_all(&[INT16])?;
                self.write_all(&(v as i16).to_be_bytes())
            }
            _ => {
                self.write_all(&[INT32])?;
                self.write_all(&v.to_be_bytes())
            }
        }
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_all(&[FLOAT32])?;
        self.write_all(&v.to_bits().to_be_bytes())
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_all(&[if v { TRUE } else { FALSE }])
    }

    pub fn write_nil(&mut self) -> Result<()> {
        self.write_all(&[NIL])
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        let len = s.len();
        if str_header_len(len)? == 1 {
            self.write_all(&[FIXSTR | len as u8])?;
        } else {
            self.write_all(&[STR8, len as u8])?;
        }
        self.write_all(s.as_bytes())
    }

    pub fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        if b.is_empty() && self.options.omits_empty() {
            return Ok(());
        }
        if b.len() > BIN8_MAX_LEN {
            return Err(Error::ValueTooLarge {
                kind: ValueKind::Bytes,
                len: b.len(),
                max: BIN8_MAX_LEN,
            });
        }
        self.write_all(&[BIN8, b.len() as u8])?;
        self.write_all(b)
    }

    pub fn write_array(&mut self, a: &Array) -> Result<()> {
        let len = a.len();
        if len == 0 && self.options.omits_empty() {
            return Ok(());
        }
        if array_header_len(len)? == 1 {
            self.write_all(&[FIXARRAY | len as u8])?;
        } else {
            self.write_all(&[ARRAY16])?;
            self.write_all(&(len as u16).to_be_bytes())?;
        }
        for item in a.iter() {
            self.encode(&item)?;
        }
        Ok(())
    }

    /// Writes a map header for `count` entries: fixmap up to 15, map16 above.
    pub fn write_map_header(&mut self, count: u16) -> Result<()> {
        if count <= FIXMAP_MAX_LEN {
            self.write_all(&[FIXMAP | count as u8])
        } else {
            self.write_all(&[MAP16])?;
            self.write_all(&count.to_be_bytes())
        }
    }
}

/// Reads values from a byte slice starting at an arbitrary offset.
///
/// Every read is bounds-checked against the slice; running out of bytes,
/// meeting an unsupported marker or invalid UTF-8 yields
/// [`Error::MalformedData`] and nothing past the slice is ever touched.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::at(buf, 0)
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Decoder { buf, pos, depth: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn peek_marker(&self) -> Result<u8> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(Error::malformed(self.pos, "unexpected end of data"))
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = self.peek_marker()?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(Error::malformed(
                self.pos,
                "declared length runs past end of data",
            ))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Decodes the value at the current position and moves past it.
    pub fn decode(&mut self) -> Result<ValueRef<'a>> {
        let offset = self.pos;
        let marker = self.read_u8()?;
        Ok(match marker {
            0x00..=POSITIVE_FIXINT_MAX => ValueRef::Uint(u32::from(marker)),
            0x80..=0x8f => self.decode_map(u16::from(marker & 0x0f))?,
            0x90..=0x9f => self.decode_array(u16::from(marker & 0x0f))?,
            0xa0..=0xbf => self.decode_str(usize::from(marker & 0x1f))?,
            NIL => ValueRef::Nil,
            FALSE => ValueRef::Bool(false),
            TRUE => ValueRef::Bool(true),
            BIN8 => {
                let len = usize::from(self.read_u8()?);
                ValueRef::Bytes(self.read_slice(len)?)
            }
            FLOAT32 => ValueRef::Float(f32::from_bits(self.read_u32()?)),
            UINT8 => ValueRef::Uint(u32::from(self.read_u8()?)),
            UINT16 => ValueRef::Uint(u32::from(self.read_u16()?)),
            UINT32 => ValueRef::Uint(self.read_u32()?),
            INT8 => ValueRef::Int(i32::from(self.read_u8()? as i8)),
            INT16 => ValueRef::Int(i32::from(self.read_u16()? as i16)),
            INT32 => ValueRef::Int(self.read_u32()? as i32),
            STR8 => {
                let len = usize::from(self.read_u8()?);
                self.decode_str(len)?
            }
            ARRAY16 => {
                let len = self.read_u16()?;
                self.decode_array(len)?
            }
            MAP16 => {
                let len = self.read_u16()?;
                self.decode_map(len)?
            }
            NEGATIVE_FIXINT..=0xff => ValueRef::Int(i32::from(marker as i8)),
            _ => return Err(Error::malformed(offset, "unsupported marker")),
        })
    }

    fn decode_str(&mut self, len: usize) -> Result<ValueRef<'a>> {
        let start = self.pos;
        let bytes = self.read_slice(len)?;
        std::str::from_utf8(bytes)
            .map(ValueRef::Str)
            .map_err(|_| Error::malformed(start, "string is not valid UTF-8"))
    }

    fn decode_array(&mut self, len: u16) -> Result<ValueRef<'a>> {
        let start = self.pos;
        self.skip_items(usize::from(len))?;
        Ok(ValueRef::Array(ArrayView::new(self.buf, start, len)))
    }

    fn decode_map(&mut self, len: u16) -> Result<ValueRef<'a>> {
        let start = self.pos;
        self.skip_items(usize::from(len) * 2)?;
        Ok(ValueRef::Map(MapView::new(self.buf, start, len)))
    }

    // Walks `count` nested values so container views only ever wrap bytes
    // that are known to decode.
    fn skip_items(&mut self, count: usize) -> Result<()> {
        if self.depth >= MAX_DECODE_DEPTH {
            return Err(Error::malformed(self.pos, "nesting too deep"));
        }
        self.depth += 1;
        for _ in 0..count {
            self.decode()?;
        }
        self.depth -= 1;
        Ok(())
    }
}
