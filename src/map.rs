//! The map builder: appends key/value entries into a caller-owned buffer.

use std::io::Write;

use tracing::debug;

use crate::codec::{self, Encoder, FIXMAP, FIXMAP_MAX_LEN, MAP16_GROWTH};
use crate::dump::HexDump;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::reader::MapReader;
use crate::value::{Array, Value};

/// Maximum number of sub-maps that can be open at the same time
pub const MAX_SUBMAPS: usize = 5;

#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    header_pos: usize,
    count: u16,
}

/// Saved parent contexts of the open sub-maps. Fixed capacity, no allocation.
#[derive(Debug)]
struct NestingStack {
    frames: [Frame; MAX_SUBMAPS],
    len: usize,
}

impl NestingStack {
    const fn new() -> Self {
        NestingStack {
            frames: [Frame {
                header_pos: 0,
                count: 0,
            }; MAX_SUBMAPS],
            len: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.len == MAX_SUBMAPS
    }

    fn push(&mut self, frame: Frame) -> Result<()> {
        let slot = self
            .frames
            .get_mut(self.len)
            .ok_or(Error::NestingTooDeep { max: MAX_SUBMAPS })?;
        *slot = frame;
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<Frame> {
        self.len = self.len.checked_sub(1)?;
        Some(self.frames[self.len])
    }

    fn bottom(&self) -> Option<&Frame> {
        self.frames[..self.len].first()
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// Builds a MessagePack map in place inside a fixed buffer.
///
/// The map header sits at offset 0 and is kept up to date after every
/// addition, so [`as_bytes`](Self::as_bytes) is always a complete, decodable
/// map (provided every opened sub-map has also been closed).
///
/// # Example
/// ```
/// use msgpack_map::MsgPackMap;
///
/// let mut buf = [0u8; 32];
/// let mut map = MsgPackMap::new(&mut buf).unwrap();
/// map.add_u8("a", 1).unwrap();
/// assert_eq!(map.as_bytes(), [0x81, 0xa1, b'a', 0x01]);
///
/// let reader = map.reader();
/// assert_eq!(reader.read_u8("a").unwrap(), 1);
/// ```
#[derive(Debug)]
pub struct MsgPackMap<'a> {
    buf: &'a mut [u8],
    cursor: usize,
    header_pos: usize,
    count: u16,
    stack: NestingStack,
    options: Options,
}

impl<'a> MsgPackMap<'a> {
    /// Wraps `buf` and begins an empty map
    pub fn new(buf: &'a mut [u8]) -> Result<Self> {
        Self::with_options(buf, Options::default())
    }

    pub fn with_options(buf: &'a mut [u8], options: Options) -> Result<Self> {
        let mut map = MsgPackMap {
            buf,
            cursor: 0,
            header_pos: 0,
            count: 0,
            stack: NestingStack::new(),
            options,
        };
        map.begin()?;
        Ok(map)
    }

    /// Discards everything written so far and starts a new empty map.
    pub fn begin(&mut self) -> Result<()> {
        let Some(header) = self.buf.first_mut() else {
            return Err(Error::BufferFull {
                needed: 1,
                available: 0,
            });
        };
        *header = FIXMAP;
        self.cursor = 1;
        self.header_pos = 0;
        self.count = 0;
        self.stack.clear();
        Ok(())
    }

    /// Zero-fills the whole buffer, then begins a new map.
    pub fn clear(&mut self) -> Result<()> {
        self.buf.fill(0);
        self.begin()
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Serialized length in bytes
    pub fn size(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Number of sub-maps currently open
    pub fn depth(&self) -> usize {
        self.stack.len
    }

    /// Number of entries in the top-level map. An open sub-map counts as one.
    pub fn num_elements(&self) -> u16 {
        self.stack.bottom().map_or(self.count, |frame| frame.count)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.cursor]
    }

    /// A reader over the bytes written so far
    pub fn reader(&self) -> MapReader<'_> {
        MapReader::new(self.as_bytes())
    }

    pub fn hex_dump(&self) -> HexDump<'_> {
        HexDump::new(self.as_bytes())
    }

    /// Sends the serialized map to `sink`, byte for byte.
    pub fn write_to<W: Write>(&self, mut sink: W) -> Result<()> {
        sink.write_all(self.as_bytes())?;
        sink.flush()?;
        Ok(())
    }

    /// Appends `key` and `value` to the innermost open map.
    ///
    /// Either the whole entry is written and counted, or the call fails and
    /// the buffer and state are left untouched.
    pub fn add<'v>(&mut self, key: &str, value: impl Into<Value<'v>>) -> Result<()> {
        let value = value.into();
        let needed = codec::encoded_len(&Value::Str(key), &self.options)?
            + codec::encoded_len(&value, &self.options)?;
        self.append_entry(needed, |encoder| {
            encoder.write_str(key)?;
            encoder.encode(&value)
        })
    }

    pub fn add_u8(&mut self, key: &str, data: u8) -> Result<()> {
        self.add(key, data)
    }

    pub fn add_u16(&mut self, key: &str, data: u16) -> Result<()> {
        self.add(key, data)
    }

    pub fn add_u32(&mut self, key: &str, data: u32) -> Result<()> {
        self.add(key, data)
    }

    pub fn add_i8(&mut self, key: &str, data: i8) -> Result<()> {
        self.add(key, data)
    }

    pub fn add_i16(&mut self, key: &str, data: i16) -> Result<()> {
        self.add(key, data)
    }

    pub fn add_i32(&mut self, key: &str, data: i32) -> Result<()> {
        self.add(key, data)
    }

    pub fn add_f32(&mut self, key: &str, data: f32) -> Result<()> {
        self.add(key, data)
    }

    pub fn add_str(&mut self, key: &str, data: &str) -> Result<()> {
        self.add(key, data)
    }

    pub fn add_bool(&mut self, key: &str, data: bool) -> Result<()> {
        self.add(key, data)
    }

    pub fn add_nil(&mut self, key: &str) -> Result<()> {
        self.add(key, Value::Nil)
    }

    /// Adds an opaque byte string (bin8, at most 255 bytes)
    pub fn add_bytes(&mut self, key: &str, data: &[u8]) -> Result<()> {
        self.add(key, Value::Bytes(data))
    }

    pub fn add_array<'v>(&mut self, key: &str, data: impl Into<Array<'v>>) -> Result<()> {
        self.add(key, Value::Array(data.into()))
    }

    pub fn add_f32_array(&mut self, key: &str, data: &[f32]) -> Result<()> {
        self.add(key, Value::Array(Array::F32(data)))
    }

    /// Opens a sub-map stored under `key`.
    ///
    /// The sub-map is one entry of the current map. Until the matching
    /// [`end_sub_map`](Self::end_sub_map), additions go into the sub-map.
    pub fn begin_sub_map(&mut self, key: &str) -> Result<()> {
        if self.stack.is_full() {
            debug!(key, max = MAX_SUBMAPS, "rejected sub-map: nesting too deep");
            return Err(Error::NestingTooDeep { max: MAX_SUBMAPS });
        }
        let needed = codec::encoded_len(&Value::Str(key), &self.options)? + 1;
        self.append_entry(needed, |encoder| {
            encoder.write_str(key)?;
            encoder.write_map_header(0)
        })?;

        self.stack.push(Frame {
            header_pos: self.header_pos,
            count: self.count,
        })?;
        self.header_pos = self.cursor - 1;
        self.count = 0;
        debug!(key, depth = self.stack.len, header_pos = self.header_pos, "opened sub-map");
        Ok(())
    }

    /// Closes the innermost sub-map; later additions go to its parent.
    pub fn end_sub_map(&mut self) -> Result<()> {
        let parent = self.stack.pop().ok_or(Error::NoOpenSubMap)?;
        debug!(entries = self.count, depth = self.stack.len, "closed sub-map");
        self.header_pos = parent.header_pos;
        self.count = parent.count;
        Ok(())
    }

    // Shared by every kind of addition: the capacity check, the one-time
    // fixmap -> map16 growth and the header rewrite.
    fn append_entry<F>(&mut self, needed: usize, write: F) -> Result<()>
    where
        F: FnOnce(&mut Encoder<&mut &mut [u8]>) -> Result<()>,
    {
        if self.count == u16::MAX {
            return Err(Error::TooManyEntries);
        }
        let growth = if self.count == FIXMAP_MAX_LEN {
            MAP16_GROWTH
        } else {
            0
        };
        let available = self.remaining();
        if needed + growth > available {
            debug!(needed = needed + growth, available, "rejected entry: buffer full");
            return Err(Error::BufferFull {
                needed: needed + growth,
                available,
            });
        }

        if growth > 0 {
            self.widen_header();
        }

        let mut slot = &mut self.buf[self.cursor..];
        let before = slot.len();
        write(&mut Encoder::with_options(&mut slot, self.options))?;
        let written = before - slot.len();

        self.cursor += written;
        self.count += 1;
        self.write_header()
    }

    // Moves the open map's entries two bytes right so its one-byte header can
    // become a three-byte map16 header. Bytes before the header belong to
    // enclosing maps and stay where they are.
    fn widen_header(&mut self) {
        let first_entry = self.header_pos + 1;
        self.buf
            .copy_within(first_entry..self.cursor, first_entry + MAP16_GROWTH);
        self.cursor += MAP16_GROWTH;
        debug!(
            header_pos = self.header_pos,
            depth = self.stack.len,
            "map header widened to map16"
        );
    }

    fn write_header(&mut self) -> Result<()> {
        Encoder::new(&mut self.buf[self.header_pos..]).write_map_header(self.count)
    }
}
