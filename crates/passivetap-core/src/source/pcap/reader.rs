use std::io::{Read, Seek, SeekFrom};

use pcap_parser::Linktype;

use crate::{Timeval, NUM_MICROS_PER_SECOND};

use super::error::PcapSourceError;
use super::layout;

/// Read the magic bytes and rewind the reader to the start, so the right
/// block reader can be constructed over the whole file.
///
/// # Errors
/// Returns `PcapSourceError` when the reader cannot be read or rewound.
pub fn read_magic_and_rewind<R: Read + Seek>(reader: &mut R) -> Result<[u8; 4], PcapSourceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

/// Check whether the magic bytes mark a PCAPNG section header.
pub fn is_pcapng_magic(magic: &[u8; 4]) -> bool {
    magic == &layout::PCAPNG_MAGIC
}

/// Resolve the linktype for a PCAPNG interface id, defaulting to Ethernet
/// when the capture never described the interface.
pub fn linktype_for_interface(linktypes: &[Linktype], if_id: u32) -> Linktype {
    linktypes
        .get(if_id as usize)
        .copied()
        .unwrap_or(Linktype::ETHERNET)
}

/// Split a PCAPNG high/low timestamp into an integer `Timeval`.
///
/// Assumes the default microsecond if_tsresol; captures with a different
/// resolution are out of scope for file replay.
pub fn pcapng_ts_to_timeval(ts_high: u32, ts_low: u32) -> Timeval {
    let micros = (((ts_high as u64) << 32) | (ts_low as u64)) as i64;
    Timeval::new(
        micros / NUM_MICROS_PER_SECOND,
        (micros % NUM_MICROS_PER_SECOND) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detect_pcapng_magic() {
        assert!(is_pcapng_magic(&layout::PCAPNG_MAGIC));
        assert!(!is_pcapng_magic(&[0xd4, 0xc3, 0xb2, 0xa1]));
    }

    #[test]
    fn read_magic_rewinds() {
        let bytes = [0x0a, 0x0d, 0x0d, 0x0a, 0x01];
        let mut cursor = Cursor::new(bytes);
        let magic = read_magic_and_rewind(&mut cursor).unwrap();
        assert_eq!(magic, [0x0a, 0x0d, 0x0d, 0x0a]);
        let mut buf = [0u8; 1];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 0x0a);
    }

    #[test]
    fn read_magic_too_short() {
        let mut cursor = Cursor::new([0x0a, 0x0d, 0x0d]);
        let err = read_magic_and_rewind(&mut cursor).unwrap_err();
        assert!(matches!(err, PcapSourceError::Io(_)));
    }

    #[test]
    fn linktype_defaults_to_ethernet_when_missing() {
        let linktypes = [Linktype::RAW];
        assert_eq!(linktype_for_interface(&linktypes, 0), Linktype::RAW);
        assert_eq!(linktype_for_interface(&linktypes, 1), Linktype::ETHERNET);
    }

    #[test]
    fn pcapng_timestamp_splits_into_seconds_and_micros() {
        let tv = pcapng_ts_to_timeval(0, 1_500_000);
        assert_eq!(tv, Timeval::new(1, 500_000));

        let big = 123_456_789_004_321u64;
        let tv = pcapng_ts_to_timeval((big >> 32) as u32, big as u32);
        assert_eq!(tv, Timeval::new(123_456_789, 4321));
    }
}
