use thiserror::Error;

use crate::Timeval;

/// Maximum samples retained per reporting cycle.
pub const PACKET_DATA_BUFFER_ENTRIES: usize = 8192;

/// One observed packet: microseconds since the series start, IP datagram
/// length, and the flow the packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSample {
    pub timestamp: u32,
    pub size: u16,
    pub flow: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeriesError {
    #[error("packet series buffer full, sample discarded")]
    Overflow,
}

/// Bounded per-cycle history of packet sizes and inter-arrival timing.
///
/// Timestamps are stored relative to the first packet of the cycle so the
/// per-sample field stays narrow. Once the buffer fills, later samples are
/// counted in `discarded_by_overflow` and dropped; stored samples are never
/// overwritten. Sample indices double as packet identifiers for correlating
/// DNS records extracted from the same packet.
///
/// Caller contract: timestamps are fed in capture order. Offsets of
/// out-of-order packets are not checked here.
#[derive(Debug, Clone)]
pub struct PacketSeries {
    samples: Vec<PacketSample>,
    start_time_microseconds: i64,
    last_time_microseconds: i64,
    discarded_by_overflow: u32,
}

impl Default for PacketSeries {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketSeries {
    pub fn new() -> Self {
        Self {
            samples: Vec::with_capacity(PACKET_DATA_BUFFER_ENTRIES),
            start_time_microseconds: 0,
            last_time_microseconds: 0,
            discarded_by_overflow: 0,
        }
    }

    /// Record one packet. Returns the sample index, which callers use as the
    /// packet identifier for DNS correlation.
    pub fn add_packet(
        &mut self,
        timestamp: Timeval,
        size: u16,
        flow: u16,
    ) -> Result<u16, SeriesError> {
        if self.samples.len() >= PACKET_DATA_BUFFER_ENTRIES {
            self.discarded_by_overflow += 1;
            return Err(SeriesError::Overflow);
        }
        let micros = timestamp.as_microseconds();
        if self.samples.is_empty() {
            self.start_time_microseconds = micros;
        }
        let index = self.samples.len() as u16;
        self.samples.push(PacketSample {
            timestamp: (micros - self.start_time_microseconds) as u32,
            size,
            flow,
        });
        self.last_time_microseconds = micros;
        Ok(index)
    }

    /// Re-arm the series for the next reporting cycle.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.start_time_microseconds = 0;
        self.last_time_microseconds = 0;
        self.discarded_by_overflow = 0;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[PacketSample] {
        &self.samples
    }

    /// Absolute time of the first sample in microseconds; 0 when empty.
    pub fn start_time_microseconds(&self) -> i64 {
        self.start_time_microseconds
    }

    /// Absolute time of the most recent sample in microseconds.
    pub fn last_time_microseconds(&self) -> i64 {
        self.last_time_microseconds
    }

    pub fn discarded_by_overflow(&self) -> u32 {
        self.discarded_by_overflow
    }
}
