//! passivetap core library: the stateful heart of a passive network monitor.
//!
//! This crate maintains compact, bounded traffic summaries over a live packet
//! stream: a five-tuple flow table with open addressing and time-windowed
//! expiration, an LRU device/address table, bounded DNS A/CNAME record
//! sequences fed by a validating DNS response parser, and a per-cycle packet
//! series. A single `Aggregator` owns all four tables and drives one packet
//! end-to-end at a time; a periodic export cycle serializes every table into
//! a line-oriented update record and resets/rebases the state.
//!
//! Invariants:
//! - Every table has a fixed capacity and a deterministic eviction policy;
//!   memory never grows with capture duration.
//! - Per-packet work is bounded (fixed probe counts, fixed scans); nothing on
//!   the packet path blocks or retries.
//! - Malformed input degrades counters, never the process: parse and
//!   capacity failures are typed errors reported to the caller, and the
//!   offending packet is dropped without partial table writes.
//! - The update format is byte-exact and stable; downstream consumers depend
//!   on it bit for bit.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use passivetap_core::{Aggregator, PacketSource, PcapFileSource};
//!
//! let mut source = PcapFileSource::open(Path::new("capture.pcap"))?;
//! let mut aggregator = Aggregator::new();
//! let mut last_seen = 0;
//! while let Some(event) = source.next_packet()? {
//!     last_seen = event.timeval.sec;
//!     let _ = aggregator.handle_packet(&event);
//! }
//! aggregator.write_update(&mut std::io::stdout(), last_seen)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod export;
pub mod protocols;
pub mod source;
pub mod whitelist;

pub use aggregate::{Aggregator, PacketError, PacketOutcome, is_address_private};
pub use source::{PacketEvent, PacketSource, PcapFileSource, SourceError};

/// Microseconds per second, the smallest time unit in the update format.
pub const NUM_MICROS_PER_SECOND: i64 = 1_000_000;

/// A capture timestamp with microsecond resolution.
///
/// The core stores integer time end to end: tables keep bounded-width
/// offsets relative to explicit origins, so absolute time only appears here
/// and in export headers.
///
/// # Examples
/// ```
/// use passivetap_core::Timeval;
///
/// let tv = Timeval::new(123_456_789, 4321);
/// assert_eq!(tv.as_microseconds(), 123_456_789_004_321);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timeval {
    /// Seconds since the Unix epoch.
    pub sec: i64,
    /// Microseconds within the second (0..1_000_000).
    pub usec: u32,
}

impl Timeval {
    pub fn new(sec: i64, usec: u32) -> Self {
        Self { sec, usec }
    }

    /// Total microseconds since the Unix epoch.
    pub fn as_microseconds(self) -> i64 {
        self.sec * NUM_MICROS_PER_SECOND + self.usec as i64
    }
}

/// Counter snapshot across all tables, for observability surfaces.
///
/// Eviction and discard events in the core are steady-state behavior, not
/// errors; this snapshot is how they become visible.
///
/// # Examples
/// ```
/// use passivetap_core::Aggregator;
///
/// let aggregator = Aggregator::new();
/// let stats = aggregator.stats();
/// assert_eq!(stats.packets_processed, 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Packets handed to the aggregator, including ignored ones.
    pub packets_processed: u64,
    /// Frames the classifier could not map to an Ethernet/IPv4 flow.
    pub packets_ignored: u64,
    /// Update records written so far.
    pub updates_written: u32,
    /// Live flow-table entries.
    pub flows_live: usize,
    /// Insertions rejected because the probe budget was exhausted.
    pub flows_dropped: u32,
    /// Cumulative expired flows.
    pub flows_expired: u32,
    /// A records accumulated in the current cycle.
    pub dns_a_records: usize,
    /// CNAME records accumulated in the current cycle.
    pub dns_cname_records: usize,
    /// DNS records suppressed by the domain whitelist.
    pub dns_records_suppressed: u32,
    /// DNS records dropped because a record sequence was at capacity.
    pub dns_records_dropped: u32,
    /// Samples in the current packet series.
    pub series_samples: usize,
    /// Samples discarded after the series buffer filled.
    pub series_discarded: u32,
    /// Live address-table entries.
    pub addresses_tracked: usize,
}
