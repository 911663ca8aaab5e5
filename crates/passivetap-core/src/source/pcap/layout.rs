/// Buffer size handed to the block readers; refilled on incomplete reads.
pub const PCAP_READER_BUFFER_SIZE: usize = 65536;

/// Section header magic that distinguishes PCAPNG from legacy PCAP.
pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
