//! Byte-exact wire format tests.
//!
//! Output must match older firmware byte for byte, so every scenario here
//! pins the exact encoding rather than just a round trip.

use msgpack_map::{Array, Error, MapReader, MsgPackMap, Options, Value, to_vec};

#[test]
fn test_single_entry_map() {
    let mut buf = [0u8; 16];
    let mut map = MsgPackMap::new(&mut buf).unwrap();
    map.add_u8("a", 1).unwrap();
    assert_eq!(hex_from_bytes(map.as_bytes()), "81a16101");
}

#[test]
fn test_integer_widths() {
    assert_encodes(Value::Uint(100), "64");
    assert_encodes(Value::Uint(200), "ccc8");
    assert_encodes(Value::Uint(300), "cd012c");
    assert_encodes(Value::Uint(100_000), "ce000186a0");
    assert_encodes(Value::Int(-32), "e0");
    assert_encodes(Value::Int(-33), "d0df");
    assert_encodes(Value::Int(-1000), "d1fc18");
    assert_encodes(Value::Int(-100_000), "d2fffe7960");
}

#[test]
fn test_negative_boundary_widths_differ() {
    assert_eq!(to_vec(&Value::Int(-32)).unwrap().len(), 1);
    assert_eq!(to_vec(&Value::Int(-33)).unwrap().len(), 2);
}

#[test]
fn test_scalars() {
    assert_encodes(Value::Nil, "c0");
    assert_encodes(Value::Bool(false), "c2");
    assert_encodes(Value::Bool(true), "c3");
    assert_encodes(Value::Float(0.5), "ca3f000000");
    assert_encodes(Value::Str("IETF"), "a449455446");
    assert_encodes(Value::Bytes(&[1, 2, 3, 4]), "c40401020304");
}

#[test]
fn test_arrays() {
    assert_encodes(Value::Array(Array::U8(&[1, 200])), "9201ccc8");
    assert_encodes(
        Value::Array(Array::F32(&[1.0, -1.0])),
        "92ca3f800000cabf800000",
    );
    let seventeen = [0i8; 17];
    assert_encodes(
        Value::Array(Array::I8(&seventeen)),
        &format!("dc0011{}", "00".repeat(17)),
    );
}

#[test]
fn test_nested_map_layout() {
    let mut buf = [0u8; 64];
    let mut map = MsgPackMap::new(&mut buf).unwrap();
    map.begin_sub_map("m").unwrap();
    map.add_u8("x", 1).unwrap();
    map.add_i8("y", -1).unwrap();
    map.end_sub_map().unwrap();
    map.add_nil("z").unwrap();

    assert_eq!(
        hex_from_bytes(map.as_bytes()),
        "82a16d82a17801a179ffa17ac0"
    );

    let reader = map.reader();
    assert_eq!(reader.num_elements().unwrap(), 2);
    assert_eq!(reader.read_u8("x").unwrap(), 1);
    assert_eq!(reader.read_i8("y").unwrap(), -1);
    assert!(reader.is_nil("z").unwrap());
    assert_eq!(reader.read_map("m").unwrap().len(), 2);
}

#[test]
fn test_sixteen_entries_grow_header() {
    let mut buf = [0u8; 128];
    let mut map = MsgPackMap::new(&mut buf).unwrap();
    for i in 0..16u8 {
        map.add_u8(&format!("key{i:02}"), i).unwrap();
    }

    let bytes = map.as_bytes();
    assert_eq!(hex_from_bytes(&bytes[..3]), "de0010");
    assert_eq!(hex_from_bytes(&bytes[3..10]), "a56b6579303000");

    let reader = MapReader::new(bytes);
    assert_eq!(reader.num_elements().unwrap(), 16);
    for i in 0..16u8 {
        assert_eq!(reader.read_u8(&format!("key{i:02}")).unwrap(), i);
    }
    let root = reader.root().unwrap();
    assert_eq!(root.len(), 16);
}

#[test]
fn test_legacy_empty_bytes_layout() {
    let mut buf = [0u8; 32];
    let mut map = MsgPackMap::with_options(&mut buf, Options::legacy()).unwrap();
    map.add_bytes("e", &[]).unwrap();
    map.add_u8("n", 7).unwrap();
    // the empty value leaves only its key behind
    assert_eq!(hex_from_bytes(map.as_bytes()), "82a165a16e07");
    assert_eq!(map.reader().read_u8("n").unwrap(), 7);
}

#[test]
fn test_received_bytes_are_validated() {
    // map claiming two entries but holding one
    let bytes = hex_to_bytes("82a16101");
    let reader = MapReader::new(&bytes);
    assert_eq!(reader.read_u8("a").unwrap(), 1);
    assert!(matches!(reader.root(), Err(Error::MalformedData { offset: 4, .. })));

    // float64 is not part of the supported subset
    let bytes = hex_to_bytes("81a166cb3ff0000000000000");
    let reader = MapReader::new(&bytes);
    assert!(matches!(reader.get("f"), Err(Error::MalformedData { offset: 3, .. })));
}

#[test]
fn test_hex_dump_of_map() {
    let mut buf = [0u8; 16];
    let mut map = MsgPackMap::new(&mut buf).unwrap();
    map.add_u16("v", 0x0a0b).unwrap();
    assert_eq!(map.hex_dump().to_string(), "81 A1 76 CD 0A 0B \n");
    assert_eq!(map.hex_dump().columns(3).to_string(), "81 A1 76 \nCD 0A 0B \n");
}

// Helper functions

fn assert_encodes(value: Value, expected_hex: &str) {
    let encoded = to_vec(&value).unwrap();
    assert_eq!(
        hex_from_bytes(&encoded),
        expected_hex,
        "Encoding mismatch for {:?}",
        value
    );
}

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

fn hex_from_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
