//! DNS response validation and record extraction.
//!
//! Split by concern: [`layout`] holds the wire constants, [`reader`] the
//! bounded cursor and name decompression, [`error`] the failure kinds, and
//! [`parser`] the section walker that produces a [`DnsResponse`].

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use error::{DnsError, RecordSection};
pub use parser::{parse_dns_response, process_dns_packet, DnsAAnswer, DnsCnameAnswer, DnsResponse};
