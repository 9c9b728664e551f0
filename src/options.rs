use serde::{Deserialize, Serialize};

/// How zero-length byte arrays and arrays are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyValues {
    /// Write an empty header (`c4 00` for bytes, `90` for arrays)
    Header,
    /// Write nothing for the value; only the key is emitted and counted.
    /// Matches older firmware byte for byte, but such a map cannot be decoded
    /// past the empty entry.
    Omit,
}

impl Default for EmptyValues {
    fn default() -> Self {
        if cfg!(feature = "legacy_empty_values") {
            EmptyValues::Omit
        } else {
            EmptyValues::Header
        }
    }
}

/// Encoder settings.
///
/// Deserializable so it can live in an application's own config file:
/// ```
/// let options: msgpack_map::Options =
///     serde_json::from_str(r#"{"empty_values": "omit"}"#).unwrap();
/// assert_eq!(options, msgpack_map::Options::legacy());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub empty_values: EmptyValues,
}

impl Options {
    /// Settings that reproduce the legacy wire output exactly
    pub fn legacy() -> Self {
        Options {
            empty_values: EmptyValues::Omit,
        }
    }

    pub(crate) fn omits_empty(&self) -> bool {
        self.empty_values == EmptyValues::Omit
    }
}
