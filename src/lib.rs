//! # msgpack_map
//!
//! Builds and reads a MessagePack map inside a single fixed-size byte buffer,
//! without allocating. Aimed at small devices that assemble a record, send it
//! over a serial link or radio, and read records sent back the same way.
//!
//! ## Features
//! - String keys with nil, bool, 8/16/32-bit signed and unsigned integers,
//!   float32, strings and byte strings up to 255 bytes, and homogeneous
//!   integer or float arrays
//! - Every integer is written in the narrowest MessagePack form that holds it
//! - Up to [`MAX_SUBMAPS`] levels of nested sub-maps
//! - The map header grows from fixmap to map16 in place when the 16th entry
//!   is added
//! - Values are found by scanning the serialized bytes for the key; there is
//!   no index and no parse tree
//! - Failed additions (`BufferFull`, `ValueTooLarge`, ...) leave the buffer
//!   untouched
//!
//! ## Wire format
//! A strict subset of MessagePack: fixmap/map16, fixstr/str8,
//! fixint/int8/int16/int32/uint8/uint16/uint32, float32, bool, nil, bin8 and
//! fixarray/array16. All multi-byte payloads are big-endian.
//!
//! ## Example
//! ```rust
//! use msgpack_map::{MsgPackMap, Error};
//!
//! let mut buf = [0u8; 128];
//! let mut map = MsgPackMap::new(&mut buf).unwrap();
//! map.add_str("id", "node-3").unwrap();
//! map.add_i16("temp", -120).unwrap();
//! map.begin_sub_map("gps").unwrap();
//! map.add_f32("lat", 19.43).unwrap();
//! map.add_f32("lon", -99.13).unwrap();
//! map.end_sub_map().unwrap();
//!
//! let mut wire = Vec::new();
//! map.write_to(&mut wire).unwrap();
//!
//! let reader = msgpack_map::MapReader::new(&wire);
//! assert_eq!(reader.num_elements().unwrap(), 3);
//! assert_eq!(reader.read_i16("temp").unwrap(), -120);
//! assert_eq!(reader.read_f32("lon").unwrap(), -99.13);
//! assert!(matches!(reader.read_u8("missing"), Err(Error::NotFound(_))));
//! ```

pub mod codec;
pub mod dump;
pub mod error;
pub mod map;
pub mod options;
pub mod reader;
pub mod value;

pub use codec::{Decoder, Encoder, encoded_len};
pub use dump::HexDump;
pub use error::{Error, Result};
pub use map::{MAX_SUBMAPS, MsgPackMap};
pub use options::{EmptyValues, Options};
pub use reader::{LegacyReader, MapReader};
pub use value::{Array, ArrayView, MapView, Value, ValueKind, ValueRef};

/// Encodes a single value on its own, outside any map
pub fn to_vec(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(encoded_len(value, &Options::default())?);
    let mut encoder = Encoder::new(&mut buf);
    encoder.encode(value)?;
    Ok(buf)
}

/// Decodes the first value in `slice`
pub fn from_slice(slice: &[u8]) -> Result<ValueRef<'_>> {
    Decoder::new(slice).decode()
}
