//! Key lookup and typed reads directly on serialized map bytes.

use tracing::trace;

use crate::codec::{
    ARRAY16, BIN8, Decoder, FIXARRAY, FIXMAP, FIXSTR, FIXSTR_MAX_LEN, FLOAT32, INT8, INT16, INT32,
    MAP16, NEGATIVE_FIXINT, POSITIVE_FIXINT_MAX, STR8, STR8_MAX_LEN, TRUE, UINT8, UINT16, UINT32,
};
use crate::dump::HexDump;
use crate::error::{Error, Result};
use crate::value::{ArrayView, MapView, ValueRef};

/// Read access to a serialized map, e.g. one received from another device.
///
/// Lookups use a linear scan over the raw bytes rather than a parse tree.
/// The scan does not track nesting: a key is found at any depth and the first
/// occurrence in byte order wins. Use [`root`](Self::root) and
/// [`MapView::get`] for lookups scoped to one map.
#[derive(Debug, Clone, Copy)]
pub struct MapReader<'a> {
    buf: &'a [u8],
}

impl<'a> MapReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        MapReader { buf }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn hex_dump(&self) -> HexDump<'a> {
        HexDump::new(self.buf)
    }

    /// Entry count of the top-level map, read from the header at offset 0
    pub fn num_elements(&self) -> Result<u16> {
        match self.buf {
            [marker, ..] if marker & 0xf0 == FIXMAP => Ok(u16::from(marker & 0x0f)),
            [MAP16, hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(Error::malformed(0, "no map header at offset 0")),
        }
    }

    /// Decodes and validates the whole top-level map.
    pub fn root(&self) -> Result<MapView<'a>> {
        match Decoder::new(self.buf).decode()? {
            ValueRef::Map(map) => Ok(map),
            _ => Err(Error::malformed(0, "top-level value is not a map")),
        }
    }

    /// Finds `key` and returns the offset of the value stored under it.
    ///
    /// Starts right after the top-level header: offset 1, or 3 for a map16
    /// header, whose count bytes are never taken for a key. Keys up to 31
    /// bytes are matched against fixstr markers, longer ones against str8
    /// markers whose length byte equals the key length. A candidate that does
    /// not match is skipped as a whole.
    pub fn locate(&self, key: &str) -> Option<usize> {
        let needle = key.as_bytes();
        let (marker, header_len) = if needle.len() <= FIXSTR_MAX_LEN {
            (FIXSTR | needle.len() as u8, 1)
        } else if needle.len() <= STR8_MAX_LEN {
            (STR8, 2)
        } else {
            return None;
        };

        let buf = self.buf;
        let mut i = if buf.first() == Some(&MAP16) { 3 } else { 1 };
        while i < buf.len() {
            let candidate = buf[i] == marker
                && (header_len == 1 || buf.get(i + 1) == Some(&(needle.len() as u8)));
            if !candidate {
                i += 1;
                continue;
            }
            let start = i + header_len;
            let end = start + needle.len();
            if buf.get(start..end) == Some(needle) {
                return Some(end);
            }
            i = end;
        }
        trace!(key, "key not found");
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.locate(key).is_some()
    }

    /// Decodes the value stored under `key`
    pub fn get(&self, key: &str) -> Result<ValueRef<'a>> {
        let pos = self
            .locate(key)
            .ok_or_else(|| Error::NotFound(key.to_owned()))?;
        Decoder::at(self.buf, pos).decode()
    }

    fn read_as<T>(
        &self,
        key: &str,
        expected: &'static str,
        convert: impl FnOnce(&ValueRef<'a>) -> Option<T>,
    ) -> Result<T> {
        let value = self.get(key)?;
        convert(&value).ok_or_else(|| Error::TypeMismatch {
            key: key.to_owned(),
            expected,
            found: value.kind(),
        })
    }

    /// Reads an integer that fits in a `u8`, whatever encoding it was stored with
    pub fn read_u8(&self, key: &str) -> Result<u8> {
        self.read_as(key, "u8", |v| v.as_u32().and_then(|n| u8::try_from(n).ok()))
    }

    pub fn read_u16(&self, key: &str) -> Result<u16> {
        self.read_as(key, "u16", |v| v.as_u32().and_then(|n| u16::try_from(n).ok()))
    }

    pub fn read_u32(&self, key: &str) -> Result<u32> {
        self.read_as(key, "u32", ValueRef::as_u32)
    }

    pub fn read_i8(&self, key: &str) -> Result<i8> {
        self.read_as(key, "i8", |v| v.as_i32().and_then(|n| i8::try_from(n).ok()))
    }

    pub fn read_i16(&self, key: &str) -> Result<i16> {
        self.read_as(key, "i16", |v| v.as_i32().and_then(|n| i16::try_from(n).ok()))
    }

    pub fn read_i32(&self, key: &str) -> Result<i32> {
        self.read_as(key, "i32", ValueRef::as_i32)
    }

    pub fn read_f32(&self, key: &str) -> Result<f32> {
        self.read_as(key, "f32", ValueRef::as_f32)
    }

    pub fn read_bool(&self, key: &str) -> Result<bool> {
        self.read_as(key, "bool", ValueRef::as_bool)
    }

    pub fn read_str(&self, key: &str) -> Result<&'a str> {
        self.read_as(key, "string", ValueRef::as_str)
    }

    /// True if `key` holds nil; `NotFound` if it is absent
    pub fn is_nil(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_nil())
    }

    pub fn read_array(&self, key: &str) -> Result<ArrayView<'a>> {
        self.read_as(key, "array", ValueRef::as_array)
    }

    pub fn read_map(&self, key: &str) -> Result<MapView<'a>> {
        self.read_as(key, "map", ValueRef::as_map)
    }

    /// Copies the byte string under `key` into `dest`, truncating to
    /// `dest.len()`. Returns the number of bytes copied.
    pub fn read_bytes(&self, key: &str, dest: &mut [u8]) -> Result<usize> {
        let bytes = self.read_as(key, "bytes", ValueRef::as_bytes)?;
        let n = bytes.len().min(dest.len());
        dest[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    /// Copies the float array under `key` into `dest`, truncating to
    /// `dest.len()`. Returns the number of elements copied.
    pub fn read_f32_array(&self, key: &str, dest: &mut [f32]) -> Result<usize> {
        let array = self.read_array(key)?;
        let mut copied = 0;
        for (slot, item) in dest.iter_mut().zip(array.iter()) {
            let item = item?;
            *slot = item.as_f32().ok_or_else(|| Error::TypeMismatch {
                key: key.to_owned(),
                expected: "f32 array",
                found: item.kind(),
            })?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Reads with the zero-value conventions of older firmware
    pub fn legacy(&self) -> LegacyReader<'a> {
        LegacyReader { inner: *self }
    }
}

/// Typed reads that never fail.
///
/// An absent key, a value stored with a marker outside the exact set the
/// firmware accepted for that read, or undecodable bytes all produce the zero
/// value (`0`, `0.0`, `false`, `""`). Note that integer reads only accept the
/// marker of their own width: a `u16` read of a value small enough to have
/// been stored as a fixint returns 0.
#[derive(Debug, Clone, Copy)]
pub struct LegacyReader<'a> {
    inner: MapReader<'a>,
}

impl<'a> LegacyReader<'a> {
    fn value_with(&self, key: &str, accepts: impl Fn(u8) -> bool) -> Option<ValueRef<'a>> {
        let pos = self.inner.locate(key)?;
        let marker = *self.inner.buf.get(pos)?;
        if !accepts(marker) {
            return None;
        }
        Decoder::at(self.inner.buf, pos).decode().ok()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn num_elements(&self) -> u8 {
        self.inner.num_elements().map_or(0, |n| n as u8)
    }

    pub fn read_u8(&self, key: &str) -> u8 {
        self.value_with(key, |m| m <= POSITIVE_FIXINT_MAX || m == UINT8)
            .and_then(|v| v.as_u32())
            .map_or(0, |n| n as u8)
    }

    pub fn read_u16(&self, key: &str) -> u16 {
        self.value_with(key, |m| m == UINT16)
            .and_then(|v| v.as_u32())
            .map_or(0, |n| n as u16)
    }

    pub fn read_u32(&self, key: &str) -> u32 {
        self.value_with(key, |m| m == UINT32)
            .and_then(|v| v.as_u32())
            .unwrap_or(0)
    }

    pub fn read_i8(&self, key: &str) -> i8 {
        self.value_with(key, |m| m >= NEGATIVE_FIXINT || m == INT8)
            .and_then(|v| v.as_i32())
            .map_or(0, |n| n as i8)
    }

    pub fn read_i16(&self, key: &str) -> i16 {
        self.value_with(key, |m| m == INT16)
            .and_then(|v| v.as_i32())
            .map_or(0, |n| n as i16)
    }

    pub fn read_i32(&self, key: &str) -> i32 {
        self.value_with(key, |m| m == INT32)
            .and_then(|v| v.as_i32())
            .unwrap_or(0)
    }

    pub fn read_f32(&self, key: &str) -> f32 {
        self.value_with(key, |m| m == FLOAT32)
            .and_then(|v| v.as_f32())
            .unwrap_or(0.0)
    }

    pub fn read_bool(&self, key: &str) -> bool {
        self.value_with(key, |m| m == TRUE).is_some()
    }

    pub fn read_str(&self, key: &str) -> &'a str {
        self.value_with(key, |m| (FIXSTR..=FIXSTR | 0x1f).contains(&m) || m == STR8)
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    /// Copies at most `dest.len()` bytes; true if `key` holds a byte string
    pub fn read_bytes(&self, key: &str, dest: &mut [u8]) -> bool {
        let Some(bytes) = self.value_with(key, |m| m == BIN8).and_then(|v| v.as_bytes()) else {
            return false;
        };
        let n = bytes.len().min(dest.len());
        dest[..n].copy_from_slice(&bytes[..n]);
        true
    }

    /// Copies at most `dest.len()` elements, writing 0.0 for elements that are
    /// not floats; true if `key` holds an array
    pub fn read_f32_array(&self, key: &str, dest: &mut [f32]) -> bool {
        let Some(array) = self
            .value_with(key, |m| (FIXARRAY..=FIXARRAY | 0x0f).contains(&m) || m == ARRAY16)
            .and_then(|v| v.as_array())
        else {
            return false;
        };
        for (slot, item) in dest.iter_mut().zip(array.iter()) {
            *slot = item.ok().and_then(|v| v.as_f32()).unwrap_or(0.0);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MsgPackMap, ValueKind};

    fn sample(buf: &mut [u8]) -> MsgPackMap<'_> {
        let mut map = MsgPackMap::new(buf).unwrap();
        map.add_u8("small", 100).unwrap();
        map.add_u16("medium", 300).unwrap();
        map.add_u32("large", 70_000).unwrap();
        map.add_i8("neg", -5).unwrap();
        map.add_i16("neg16", -1000).unwrap();
        map.add_i32("neg32", -100_000).unwrap();
        map.add_f32("pi", 3.25).unwrap();
        map.add_str("name", "sensor-7").unwrap();
        map.add_bool("on", true).unwrap();
        map.add_bool("off", false).unwrap();
        map.add_nil("none").unwrap();
        map.add_bytes("raw", &[1, 2, 3, 4]).unwrap();
        map.add_f32_array("vec", &[1.0, 2.0, 3.0]).unwrap();
        map.add_array("ints", &[1i16, -2][..]).unwrap();
        map
    }

    #[test]
    fn test_typed_reads() {
        let mut buf = [0u8; 256];
        let map = sample(&mut buf);
        let reader = map.reader();
        assert_eq!(reader.read_u8("small").unwrap(), 100);
        assert_eq!(reader.read_u16("medium").unwrap(), 300);
        assert_eq!(reader.read_u32("large").unwrap(), 70_000);
        assert_eq!(reader.read_i8("neg").unwrap(), -5);
        assert_eq!(reader.read_i16("neg16").unwrap(), -1000);
        assert_eq!(reader.read_i32("neg32").unwrap(), -100_000);
        assert_eq!(reader.read_f32("pi").unwrap(), 3.25);
        assert_eq!(reader.read_str("name").unwrap(), "sensor-7");
        assert!(reader.read_bool("on").unwrap());
        assert!(!reader.read_bool("off").unwrap());
        assert!(reader.is_nil("none").unwrap());
        assert!(!reader.is_nil("on").unwrap());
        assert_eq!(reader.num_elements().unwrap(), 14);
    }

    #[test]
    fn test_integer_reads_widen() {
        let mut buf = [0u8; 256];
        let map = sample(&mut buf);
        let reader = map.reader();
        assert_eq!(reader.read_u32("small").unwrap(), 100);
        assert_eq!(reader.read_u16("small").unwrap(), 100);
        assert_eq!(reader.read_i32("medium").unwrap(), 300);
        assert_eq!(reader.read_i32("neg").unwrap(), -5);
        assert_eq!(reader.read_i8("small").unwrap(), 100);
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let mut buf = [0u8; 256];
        let map = sample(&mut buf);
        let reader = map.reader();
        assert!(matches!(reader.read_u8("absent"), Err(Error::NotFound(k)) if k == "absent"));
        assert!(matches!(reader.read_str("absent"), Err(Error::NotFound(_))));
        assert!(!reader.contains_key("absent"));
        assert!(reader.contains_key("small"));
    }

    #[test]
    fn test_wrong_kind_is_type_mismatch() {
        let mut buf = [0u8; 256];
        let map = sample(&mut buf);
        let reader = map.reader();
        assert!(matches!(
            reader.read_u8("name"),
            Err(Error::TypeMismatch { expected: "u8", found: ValueKind::Str, .. })
        ));
        assert!(matches!(
            reader.read_u8("medium"),
            Err(Error::TypeMismatch { found: ValueKind::Uint, .. })
        ));
        assert!(matches!(
            reader.read_u32("neg"),
            Err(Error::TypeMismatch { found: ValueKind::Int, .. })
        ));
        assert!(matches!(
            reader.read_f32("small"),
            Err(Error::TypeMismatch { found: ValueKind::Uint, .. })
        ));
        assert!(matches!(
            reader.read_f32_array("ints", &mut [0.0; 2]),
            Err(Error::TypeMismatch { found: ValueKind::Uint, .. })
        ));
    }

    #[test]
    fn test_bytes_and_float_arrays_truncate() {
        let mut buf = [0u8; 256];
        let map = sample(&mut buf);
        let reader = map.reader();

        let mut small = [0u8; 2];
        assert_eq!(reader.read_bytes("raw", &mut small).unwrap(), 2);
        assert_eq!(small, [1, 2]);
        let mut big = [0u8; 8];
        assert_eq!(reader.read_bytes("raw", &mut big).unwrap(), 4);
        assert_eq!(&big[..4], &[1, 2, 3, 4]);

        let mut floats = [0.0f32; 2];
        assert_eq!(reader.read_f32_array("vec", &mut floats).unwrap(), 2);
        assert_eq!(floats, [1.0, 2.0]);
        let mut floats = [9.0f32; 5];
        assert_eq!(reader.read_f32_array("vec", &mut floats).unwrap(), 3);
        assert_eq!(floats, [1.0, 2.0, 3.0, 9.0, 9.0]);
    }

    #[test]
    fn test_read_array_of_ints() {
        let mut buf = [0u8; 256];
        let map = sample(&mut buf);
        let ints: Vec<i32> = map
            .reader()
            .read_array("ints")
            .unwrap()
            .iter()
            .map(|v| v.unwrap().as_i32().unwrap())
            .collect();
        assert_eq!(ints, vec![1, -2]);
    }

    #[test]
    fn test_locate_skips_non_matching_candidates() {
        // "ab" -> "xy", then "xy" -> 1: the value "xy" is found first for key "xy"
        let bytes = [0x82, 0xa2, b'a', b'b', 0xa2, b'x', b'y', 0xa2, b'x', b'y', 0x01];
        let reader = MapReader::new(&bytes);
        assert_eq!(reader.locate("ab"), Some(4));
        assert_eq!(reader.locate("xy"), Some(7));
        assert_eq!(reader.locate("zz"), None);
    }

    #[test]
    fn test_locate_first_occurrence_wins_across_nesting() {
        let mut buf = [0u8; 64];
        let mut map = MsgPackMap::new(&mut buf).unwrap();
        map.begin_sub_map("inner").unwrap();
        map.add_u8("id", 1).unwrap();
        map.end_sub_map().unwrap();
        map.add_u8("id", 2).unwrap();
        assert_eq!(map.reader().read_u8("id").unwrap(), 1);
    }

    #[test]
    fn test_long_keys_use_str8_length_byte() {
        let key32 = "k".repeat(32);
        let key40 = "k".repeat(40);
        let mut buf = [0u8; 256];
        let mut map = MsgPackMap::new(&mut buf).unwrap();
        map.add_u8(&key40, 40).unwrap();
        map.add_u8(&key32, 32).unwrap();
        let reader = map.reader();
        assert_eq!(reader.read_u8(&key32).unwrap(), 32);
        assert_eq!(reader.read_u8(&key40).unwrap(), 40);
        assert!(!reader.contains_key(&"k".repeat(33)));
        assert!(!reader.contains_key(&"k".repeat(300)));
    }

    #[test]
    fn test_map16_count_bytes_are_not_scanned() {
        // 163 entries make the header `de 00 a3`, whose low count byte looks
        // like the fixstr marker of a 3-byte key
        let mut buf = vec![0u8; 2048];
        let mut map = MsgPackMap::new(&mut buf).unwrap();
        map.add_u8("abc", 1).unwrap();
        for i in 1..163u16 {
            map.add_u16(&format!("e{i}"), i).unwrap();
        }
        let reader = map.reader();
        assert_eq!(&reader.as_bytes()[..3], &[0xde, 0x00, 0xa3]);
        assert_eq!(reader.locate("abc"), Some(7));
        assert_eq!(reader.read_u8("abc").unwrap(), 1);
        assert_eq!(reader.legacy().read_u8("abc"), 1);
        assert_eq!(reader.read_u16("e162").unwrap(), 162);
    }

    #[test]
    fn test_locate_never_reads_out_of_bounds() {
        // candidate marker at the very end with its key bytes missing
        let bytes = [0x81, 0xa3, b'a'];
        let reader = MapReader::new(&bytes);
        assert_eq!(reader.locate("abc"), None);
        let bytes = [0x81, 0xd9];
        assert_eq!(MapReader::new(&bytes).locate(&"x".repeat(40)), None);
    }

    #[test]
    fn test_truncated_value_is_malformed() {
        // "a" -> uint16 missing its last byte
        let bytes = [0x81, 0xa1, b'a', 0xcd, 0x01];
        let reader = MapReader::new(&bytes);
        assert!(matches!(reader.read_u16("a"), Err(Error::MalformedData { .. })));
        assert!(matches!(reader.root(), Err(Error::MalformedData { .. })));
    }

    #[test]
    fn test_num_elements_requires_map_header() {
        assert!(matches!(
            MapReader::new(&[0xa1, b'a']).num_elements(),
            Err(Error::MalformedData { offset: 0, .. })
        ));
        assert!(MapReader::new(&[]).num_elements().is_err());
        assert_eq!(MapReader::new(&[0xde, 0x00, 0x12]).num_elements().unwrap(), 18);
    }

    #[test]
    fn test_legacy_reads_return_zero_values() {
        let mut buf = [0u8; 256];
        let map = sample(&mut buf);
        let legacy = map.reader().legacy();
        assert_eq!(legacy.read_u8("absent"), 0);
        assert_eq!(legacy.read_f32("absent"), 0.0);
        assert!(!legacy.read_bool("absent"));
        assert_eq!(legacy.read_str("absent"), "");
        assert!(!legacy.read_bytes("absent", &mut [0u8; 4]));
        assert!(!legacy.read_f32_array("absent", &mut [0.0; 4]));
        assert_eq!(legacy.read_u8("name"), 0);
        assert_eq!(legacy.num_elements(), 14);
    }

    #[test]
    fn test_legacy_reads_use_exact_markers() {
        let mut buf = [0u8; 256];
        let map = sample(&mut buf);
        let legacy = map.reader().legacy();
        assert_eq!(legacy.read_u8("small"), 100);
        assert_eq!(legacy.read_u16("medium"), 300);
        assert_eq!(legacy.read_u32("large"), 70_000);
        assert_eq!(legacy.read_i8("neg"), -5);
        assert_eq!(legacy.read_i16("neg16"), -1000);
        assert_eq!(legacy.read_i32("neg32"), -100_000);
        assert_eq!(legacy.read_f32("pi"), 3.25);
        assert_eq!(legacy.read_str("name"), "sensor-7");
        assert!(legacy.read_bool("on"));
        assert!(!legacy.read_bool("off"));

        // narrower encodings are not accepted by wider reads
        assert_eq!(legacy.read_u16("small"), 0);
        assert_eq!(legacy.read_i32("neg"), 0);

        let mut raw = [0u8; 2];
        assert!(legacy.read_bytes("raw", &mut raw));
        assert_eq!(raw, [1, 2]);

        let mut floats = [0.0f32; 3];
        assert!(legacy.read_f32_array("vec", &mut floats));
        assert_eq!(floats, [1.0, 2.0, 3.0]);
        let mut floats = [5.0f32; 2];
        assert!(legacy.read_f32_array("ints", &mut floats));
        assert_eq!(floats, [0.0, 0.0]);
    }
}
