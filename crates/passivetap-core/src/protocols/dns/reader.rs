use super::layout;

/// Why a domain name could not be decoded; the parser maps this onto the
/// section-specific error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    Truncated,
    Malformed,
}

/// Bounded cursor over a full DNS message.
///
/// All slicing lives here so the parser only sequences reads. The reader
/// keeps the whole message in view because compressed names may point
/// anywhere before the cursor.
#[derive(Clone)]
pub struct DnsReader<'a> {
    message: &'a [u8],
    cursor: usize,
}

impl<'a> DnsReader<'a> {
    pub fn new(message: &'a [u8]) -> Self {
        Self { message, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.message.len() - self.cursor
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        let bytes = self.read_slice(2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.read_slice(4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_slice(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.cursor.checked_add(len)?;
        let slice = self.message.get(self.cursor..end)?;
        self.cursor = end;
        Some(slice)
    }

    pub fn skip(&mut self, len: usize) -> Option<()> {
        self.read_slice(len).map(|_| ())
    }

    /// Decode a possibly-compressed domain name at the cursor, advancing
    /// the cursor past its in-place encoding (a pointer consumes two bytes
    /// regardless of where it leads).
    pub fn read_name(&mut self) -> Result<String, NameError> {
        let mut name = String::new();
        let mut pos = self.cursor;
        let mut jumped = false;
        let mut jumps = 0;

        loop {
            let len = *self.message.get(pos).ok_or(NameError::Truncated)?;
            if len & layout::NAME_POINTER_TAG == layout::NAME_POINTER_TAG {
                let low = *self.message.get(pos + 1).ok_or(NameError::Truncated)?;
                jumps += 1;
                if jumps > layout::MAX_NAME_POINTER_JUMPS {
                    return Err(NameError::Malformed);
                }
                let target = ((len & !layout::NAME_POINTER_TAG) as usize) << 8 | low as usize;
                if target >= self.message.len() {
                    return Err(NameError::Malformed);
                }
                if !jumped {
                    self.cursor = pos + 2;
                    jumped = true;
                }
                pos = target;
            } else if len == 0 {
                if !jumped {
                    self.cursor = pos + 1;
                }
                return Ok(name);
            } else if len as usize <= layout::MAX_LABEL_LEN {
                let start = pos + 1;
                let end = start + len as usize;
                let label = self.message.get(start..end).ok_or(NameError::Truncated)?;
                if name.len() + label.len() + 1 > layout::MAX_NAME_LEN {
                    return Err(NameError::Malformed);
                }
                if !name.is_empty() {
                    name.push('.');
                }
                for &byte in label {
                    name.push(byte as char);
                }
                pos = end;
            } else {
                // 0x40/0x80 label tags are reserved and never valid here.
                return Err(NameError::Malformed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_the_cursor() {
        let mut reader = DnsReader::new(&[0x12, 0x34, 0x00, 0x00, 0x00, 0x05]);
        assert_eq!(reader.read_u16(), Some(0x1234));
        assert_eq!(reader.read_u32(), Some(5));
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.read_u16(), None);
    }

    #[test]
    fn plain_name_decodes() {
        let message = [3, b'f', b'o', b'o', 3, b'c', b'o', b'm', 0, 0xff];
        let mut reader = DnsReader::new(&message);
        assert_eq!(reader.read_name(), Ok("foo.com".to_string()));
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn compressed_name_follows_pointer_and_keeps_cursor() {
        // "foo.com" at offset 0, then "www" + pointer to offset 0.
        let message = [
            3, b'f', b'o', b'o', 3, b'c', b'o', b'm', 0, // offset 0..9
            3, b'w', b'w', b'w', 0xc0, 0x00, // offset 9..15
            0xaa,
        ];
        let mut reader = DnsReader::new(&message);
        reader.skip(9).unwrap();
        assert_eq!(reader.read_name(), Ok("www.foo.com".to_string()));
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn pointer_loop_is_rejected() {
        // Two pointers referencing each other.
        let message = [0xc0, 0x02, 0xc0, 0x00];
        let mut reader = DnsReader::new(&message);
        assert_eq!(reader.read_name(), Err(NameError::Malformed));
    }

    #[test]
    fn truncated_name_is_rejected() {
        let message = [3, b'f', b'o'];
        let mut reader = DnsReader::new(&message);
        assert_eq!(reader.read_name(), Err(NameError::Truncated));
    }

    #[test]
    fn pointer_past_the_message_is_rejected() {
        let message = [0xc0, 0x7f];
        let mut reader = DnsReader::new(&message);
        assert_eq!(reader.read_name(), Err(NameError::Malformed));
    }
}
