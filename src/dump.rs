use std::fmt::{self, Write as _};

/// Human-readable hex rendering of serialized bytes.
///
/// Each byte is printed as two upper-case hex digits followed by a space.
/// Without columns the dump ends with a newline; with
/// [`columns`](Self::columns) a newline follows every `n` bytes instead.
///
/// ```
/// use msgpack_map::HexDump;
///
/// let bytes = [0x81, 0xa1, 0x61, 0x01];
/// assert_eq!(HexDump::new(&bytes).to_string(), "81 A1 61 01 \n");
/// assert_eq!(HexDump::new(&bytes).columns(2).to_string(), "81 A1 \n61 01 \n");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HexDump<'a> {
    bytes: &'a [u8],
    columns: Option<usize>,
}

impl<'a> HexDump<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        HexDump {
            bytes,
            columns: None,
        }
    }

    /// Wraps the output after every `n` bytes; 0 disables wrapping
    pub fn columns(mut self, n: usize) -> Self {
        self.columns = (n > 0).then_some(n);
        self
    }
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let digits = hex::encode_upper(self.bytes);
        for i in 0..self.bytes.len() {
            f.write_str(&digits[2 * i..2 * i + 2])?;
            f.write_char(' ')?;
            if let Some(n) = self.columns {
                if (i + 1) % n == 0 {
                    f.write_char('\n')?;
                }
            }
        }
        if self.columns.is_none() {
            f.write_char('\n')?;
        }
        Ok(())
    }
}
