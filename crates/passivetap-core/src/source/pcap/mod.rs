//! PCAP/PCAPNG file source.
//!
//! A `PacketSource` backed by capture files: the offline stand-in for live
//! capture. Handles file I/O and block-level parsing, emitting raw frame
//! events for the aggregation pipeline.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::PcapFileSource;
