pub const HEADER_LEN: usize = 12;

pub const ID_RANGE: std::ops::Range<usize> = 0..2;
pub const FLAGS_RANGE: std::ops::Range<usize> = 2..4;
pub const QDCOUNT_RANGE: std::ops::Range<usize> = 4..6;
pub const ANCOUNT_RANGE: std::ops::Range<usize> = 6..8;
pub const NSCOUNT_RANGE: std::ops::Range<usize> = 8..10;
pub const ARCOUNT_RANGE: std::ops::Range<usize> = 10..12;

/// QR bit: set on responses.
pub const FLAG_RESPONSE: u16 = 0x8000;

pub const TYPE_A: u16 = 1;
pub const TYPE_CNAME: u16 = 5;
pub const CLASS_IN: u16 = 1;

/// Fixed resource-record tail after the name: type, class, TTL, rdlength.
pub const RR_FIXED_LEN: usize = 10;
/// Question tail after the name: qtype and qclass.
pub const QUESTION_FIXED_LEN: usize = 4;
/// An A record's rdata is exactly one IPv4 address.
pub const A_RDATA_LEN: usize = 4;

/// Both high bits of a length byte mark a compression pointer.
pub const NAME_POINTER_TAG: u8 = 0xc0;
pub const MAX_LABEL_LEN: usize = 63;
pub const MAX_NAME_LEN: usize = 255;
/// Pointer-jump budget while decoding one name; pointer loops are rejected
/// long before this is exhausted.
pub const MAX_NAME_POINTER_JUMPS: usize = 32;
