use std::net::Ipv4Addr;

use thiserror::Error;

/// Number of slots in the flow table.
pub const FLOW_TABLE_ENTRIES: usize = 4096;
/// Probe budget per lookup/insert. Insertion fails rather than probing
/// further, keeping per-packet cost constant.
pub const HT_NUM_PROBES: usize = 32;
/// A flow untouched for longer than this is expired.
pub const FLOW_TABLE_EXPIRATION_SECONDS: i64 = 360;
/// Earliest accepted timestamp, relative to the table's base. Per-entry
/// offsets are stored as `i16`, so the window matches that width.
pub const FLOW_TABLE_MIN_UPDATE_OFFSET: i64 = i16::MIN as i64;
/// Latest accepted timestamp, relative to the table's base.
pub const FLOW_TABLE_MAX_UPDATE_OFFSET: i64 = i16::MAX as i64;
/// Lowest flow identity handed out; 0 is reserved for "no flow".
pub const FLOW_ID_FIRST_UNRESERVED: FlowId = 1;

pub type FlowId = u16;

/// Five-tuple identifying a transport flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowTuple {
    pub ip_source: Ipv4Addr,
    pub ip_destination: Ipv4Addr,
    pub transport_protocol: u8,
    pub port_source: u16,
    pub port_destination: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowTableError {
    #[error("timestamp {timestamp} outside the accepted window around base {base}")]
    OutOfWindow { timestamp: i64, base: i64 },
    #[error("probe budget exhausted, flow dropped")]
    Dropped,
}

/// Export state of a live entry. Flow rows describe the immutable
/// tuple-to-id binding, so each flow is exported once per lifetime;
/// timestamp refreshes do not return a row to the pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportState {
    Pending,
    Exported,
}

#[derive(Debug, Clone)]
struct FlowEntry {
    tuple: FlowTuple,
    /// Seconds relative to `base_timestamp_seconds`; may go negative after a
    /// rebase, bounded by the expiration window.
    last_update_offset: i16,
    export: ExportState,
}

/// Tombstones keep probe sequences walkable past deleted entries and are
/// reclaimed by later insertions.
#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Occupied(FlowEntry),
    Tombstone,
}

/// Fixed-capacity five-tuple table with quadratic probing and lazy
/// time-windowed expiration.
///
/// Flow identities are slot indices offset by [`FLOW_ID_FIRST_UNRESERVED`].
/// All per-entry timestamps are narrow offsets from
/// `base_timestamp_seconds`; [`FlowTable::advance_base_timestamp`] rebases
/// them so the offset field never widens regardless of capture duration.
pub struct FlowTable {
    slots: Vec<Slot>,
    num_elements: usize,
    num_dropped_flows: u32,
    num_expired_flows: u32,
    base_timestamp_seconds: i64,
    hash: fn(&FlowTuple) -> u32,
}

impl Default for FlowTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowTable {
    pub fn new() -> Self {
        Self::with_hash(fnv_tuple_hash)
    }

    /// Build a table with an explicit hash function. Production code uses
    /// the default; tests inject constant hashes to force collisions.
    pub fn with_hash(hash: fn(&FlowTuple) -> u32) -> Self {
        Self {
            slots: vec![Slot::Empty; FLOW_TABLE_ENTRIES],
            num_elements: 0,
            num_dropped_flows: 0,
            num_expired_flows: 0,
            base_timestamp_seconds: 0,
            hash,
        }
    }

    /// Look up or insert the flow for `tuple` observed at `timestamp`
    /// (seconds). Returns the flow identity, reused when the flow is
    /// already live.
    ///
    /// Each slot on the probe walk is age-checked before key comparison, so
    /// a stale entry is expired even when it holds the incoming key; the
    /// key is then re-admitted as a new flow. Expiring the walk down to
    /// zero live entries resets the base timestamp to `timestamp`.
    pub fn process_flow(
        &mut self,
        tuple: FlowTuple,
        timestamp: i64,
    ) -> Result<FlowId, FlowTableError> {
        if self.num_elements == 0 {
            self.base_timestamp_seconds = timestamp;
        }
        let offset = timestamp - self.base_timestamp_seconds;
        if !(FLOW_TABLE_MIN_UPDATE_OFFSET..=FLOW_TABLE_MAX_UPDATE_OFFSET).contains(&offset) {
            return Err(FlowTableError::OutOfWindow {
                timestamp,
                base: self.base_timestamp_seconds,
            });
        }

        let hash = (self.hash)(&tuple);
        let mut claim = None;
        for probe in 0..HT_NUM_PROBES {
            let index = probe_slot(hash, probe);
            match &self.slots[index] {
                Slot::Occupied(entry) => {
                    let age =
                        timestamp - (self.base_timestamp_seconds + entry.last_update_offset as i64);
                    if age > FLOW_TABLE_EXPIRATION_SECONDS {
                        self.slots[index] = Slot::Tombstone;
                        self.num_elements -= 1;
                        self.num_expired_flows += 1;
                        claim.get_or_insert(index);
                    } else if entry.tuple == tuple {
                        if let Slot::Occupied(entry) = &mut self.slots[index] {
                            entry.last_update_offset = offset as i16;
                        }
                        return Ok(flow_id(index));
                    }
                }
                Slot::Tombstone => {
                    claim.get_or_insert(index);
                }
                Slot::Empty => {
                    // An empty slot ends every probe sequence that could
                    // hold this key.
                    claim.get_or_insert(index);
                    break;
                }
            }
        }

        match claim {
            Some(index) => {
                if self.num_elements == 0 {
                    self.base_timestamp_seconds = timestamp;
                }
                self.slots[index] = Slot::Occupied(FlowEntry {
                    tuple,
                    last_update_offset: (timestamp - self.base_timestamp_seconds) as i16,
                    export: ExportState::Pending,
                });
                self.num_elements += 1;
                Ok(flow_id(index))
            }
            None => {
                self.num_dropped_flows += 1;
                Err(FlowTableError::Dropped)
            }
        }
    }

    /// Rebase all live entries against `new_base`, expiring any whose
    /// recomputed offset falls behind the expiration window (or outside the
    /// representable range). Callable independent of packet arrival so
    /// flows age out during quiet periods.
    pub fn advance_base_timestamp(&mut self, new_base: i64) {
        for slot in &mut self.slots {
            if let Slot::Occupied(entry) = slot {
                let absolute = self.base_timestamp_seconds + entry.last_update_offset as i64;
                let offset = absolute - new_base;
                if offset < -FLOW_TABLE_EXPIRATION_SECONDS
                    || offset < FLOW_TABLE_MIN_UPDATE_OFFSET
                    || offset > FLOW_TABLE_MAX_UPDATE_OFFSET
                {
                    *slot = Slot::Tombstone;
                    self.num_elements -= 1;
                    self.num_expired_flows += 1;
                } else {
                    entry.last_update_offset = offset as i16;
                }
            }
        }
        self.base_timestamp_seconds = new_base;
    }

    /// Export sweep: every pending row becomes exported.
    pub fn mark_exported(&mut self) {
        for slot in &mut self.slots {
            if let Slot::Occupied(entry) = slot {
                entry.export = ExportState::Exported;
            }
        }
    }

    /// Live flows not yet included in any update, in slot order.
    pub fn pending_flows(&self) -> impl Iterator<Item = (FlowId, &FlowTuple)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            match slot {
                Slot::Occupied(entry) if entry.export == ExportState::Pending => {
                    Some((flow_id(index), &entry.tuple))
                }
                _ => None,
            }
        })
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn num_dropped_flows(&self) -> u32 {
        self.num_dropped_flows
    }

    pub fn num_expired_flows(&self) -> u32 {
        self.num_expired_flows
    }

    pub fn base_timestamp_seconds(&self) -> i64 {
        self.base_timestamp_seconds
    }
}

fn flow_id(index: usize) -> FlowId {
    index as FlowId + FLOW_ID_FIRST_UNRESERVED
}

/// Quadratic probing: probe `k` lands `k*(k+1)/2` slots past the hash.
fn probe_slot(hash: u32, probe: usize) -> usize {
    (hash as usize + probe * (probe + 1) / 2) % FLOW_TABLE_ENTRIES
}

fn fnv_tuple_hash(tuple: &FlowTuple) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET_BASIS;
    let mut mix = |bytes: &[u8]| {
        for &byte in bytes {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(PRIME);
        }
    };
    mix(&tuple.ip_source.octets());
    mix(&tuple.ip_destination.octets());
    mix(&[tuple.transport_protocol]);
    mix(&tuple.port_source.to_be_bytes());
    mix(&tuple.port_destination.to_be_bytes());
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 123_456_789;

    fn zero_hash(_tuple: &FlowTuple) -> u32 {
        0
    }

    fn table() -> FlowTable {
        FlowTable::with_hash(zero_hash)
    }

    fn tuple(ip_source: u32) -> FlowTuple {
        FlowTuple {
            ip_source: Ipv4Addr::from(ip_source),
            ip_destination: Ipv4Addr::from(2u32),
            transport_protocol: 3,
            port_source: 4,
            port_destination: 5,
        }
    }

    fn entry_offset(table: &FlowTable, index: usize) -> Option<i16> {
        match &table.slots[index] {
            Slot::Occupied(entry) => Some(entry.last_update_offset),
            _ => None,
        }
    }

    fn is_tombstone(table: &FlowTable, index: usize) -> bool {
        matches!(table.slots[index], Slot::Tombstone)
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let mut table = table();
        let first = table.process_flow(tuple(1), SEC).unwrap();
        assert_eq!(table.num_elements(), 1);
        let second = table.process_flow(tuple(1), SEC).unwrap();
        assert_eq!(table.num_elements(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn colliding_keys_follow_the_probe_sequence() {
        let mut table = table();
        assert_eq!(table.process_flow(tuple(1), SEC), Ok(FLOW_ID_FIRST_UNRESERVED));
        assert_eq!(
            table.process_flow(tuple(10), SEC),
            Ok(FLOW_ID_FIRST_UNRESERVED + 1)
        );
        // Third collision probes 0, 1, then 3.
        assert_eq!(
            table.process_flow(tuple(20), SEC),
            Ok(FLOW_ID_FIRST_UNRESERVED + 3)
        );
        assert_eq!(table.num_elements(), 3);
    }

    #[test]
    fn probe_budget_bounds_collisions() {
        let mut table = table();
        for n in 0..HT_NUM_PROBES as u32 {
            table.process_flow(tuple(n + 1), SEC).unwrap();
            assert_eq!(table.num_elements(), n as usize + 1);
        }

        assert_eq!(
            table.process_flow(tuple(9999), SEC),
            Err(FlowTableError::Dropped)
        );
        assert_eq!(table.num_elements(), HT_NUM_PROBES);
        assert_eq!(table.num_dropped_flows(), 1);
        assert_eq!(table.num_expired_flows(), 0);
    }

    #[test]
    fn base_resets_when_the_table_drains() {
        let mut table = table();
        table.process_flow(tuple(1), SEC).unwrap();
        assert_eq!(table.base_timestamp_seconds(), SEC);

        table.process_flow(tuple(10), SEC + 1).unwrap();
        assert_eq!(table.base_timestamp_seconds(), SEC);

        table.mark_exported();

        // Both entries exceed the window; even the rediscovered key expires
        // and is re-admitted as new, draining the table and resetting base.
        let new_timestamp = SEC + 1 + FLOW_TABLE_EXPIRATION_SECONDS + 1;
        table.process_flow(tuple(10), new_timestamp).unwrap();
        assert_eq!(table.base_timestamp_seconds(), new_timestamp);
        assert_eq!(table.num_expired_flows(), 2);
        assert_eq!(table.num_dropped_flows(), 0);
        assert_eq!(table.num_elements(), 1);
    }

    #[test]
    fn advance_rebases_and_expires() {
        let mut table = table();
        table.process_flow(tuple(1), SEC).unwrap();
        assert_eq!(table.num_elements(), 1);

        table.advance_base_timestamp(SEC + 1);
        assert_eq!(table.num_elements(), 1);
        assert_eq!(entry_offset(&table, 0), Some(-1));

        table.advance_base_timestamp(SEC + FLOW_TABLE_EXPIRATION_SECONDS + 1);
        assert_eq!(table.num_elements(), 0);
        assert!(is_tombstone(&table, 0));
        assert_eq!(table.num_expired_flows(), 1);
    }

    #[test]
    fn timestamps_outside_the_window_are_rejected() {
        let mut table = table();
        table.process_flow(tuple(1), SEC).unwrap();
        assert_eq!(table.num_elements(), 1);

        let late = SEC + FLOW_TABLE_MAX_UPDATE_OFFSET + 1;
        assert!(matches!(
            table.process_flow(tuple(10), late),
            Err(FlowTableError::OutOfWindow { .. })
        ));

        let early = SEC + FLOW_TABLE_MIN_UPDATE_OFFSET - 1;
        assert!(matches!(
            table.process_flow(tuple(10), early),
            Err(FlowTableError::OutOfWindow { .. })
        ));
        assert_eq!(table.num_elements(), 1);
    }

    #[test]
    fn duplicates_refresh_the_update_time() {
        let mut table = table();
        assert_eq!(table.process_flow(tuple(1), SEC), Ok(FLOW_ID_FIRST_UNRESERVED));
        assert_eq!(entry_offset(&table, 0), Some(0));

        assert_eq!(
            table.process_flow(tuple(1), SEC + 60),
            Ok(FLOW_ID_FIRST_UNRESERVED)
        );
        assert_eq!(entry_offset(&table, 0), Some(60));
        assert_eq!(table.num_elements(), 1);
        assert_eq!(table.num_expired_flows(), 0);
        assert_eq!(table.num_dropped_flows(), 0);
    }

    #[test]
    fn stale_entries_expire_during_lookups() {
        let mut table = table();
        table.process_flow(tuple(1), SEC).unwrap();
        table.process_flow(tuple(2), SEC).unwrap();
        assert_eq!(table.num_elements(), 2);

        table.mark_exported();

        // A new key reclaims the first expired slot; the walk tombstones
        // every stale entry it passes.
        assert_eq!(
            table.process_flow(tuple(3), SEC + FLOW_TABLE_EXPIRATION_SECONDS + 1),
            Ok(FLOW_ID_FIRST_UNRESERVED)
        );
        assert_eq!(table.num_elements(), 1);
        assert!(is_tombstone(&table, 1));
        assert_eq!(table.num_expired_flows(), 2);
        assert_eq!(table.num_dropped_flows(), 0);
    }

    #[test]
    fn a_key_at_the_expiration_boundary_is_still_a_duplicate() {
        let mut table = table();
        table.process_flow(tuple(1), SEC).unwrap();
        table.process_flow(tuple(2), SEC + 1).unwrap();
        assert_eq!(table.num_elements(), 2);

        table.mark_exported();

        // tuple(2) is exactly FLOW_TABLE_EXPIRATION_SECONDS old: live, so
        // it is refreshed in place while tuple(1) expires.
        assert_eq!(
            table.process_flow(tuple(2), SEC + FLOW_TABLE_EXPIRATION_SECONDS + 1),
            Ok(FLOW_ID_FIRST_UNRESERVED + 1)
        );
        assert_eq!(table.num_elements(), 1);
        assert!(is_tombstone(&table, 0));
        assert_eq!(table.num_expired_flows(), 1);
    }

    #[test]
    fn refreshed_duplicates_stay_exported() {
        let mut table = table();
        table.process_flow(tuple(1), SEC).unwrap();
        assert_eq!(table.pending_flows().count(), 1);

        table.mark_exported();
        assert_eq!(table.pending_flows().count(), 0);

        table.process_flow(tuple(1), SEC + 5).unwrap();
        assert_eq!(table.pending_flows().count(), 0);
    }

    #[test]
    fn default_hash_spreads_distinct_tuples() {
        let a = fnv_tuple_hash(&tuple(1));
        let b = fnv_tuple_hash(&tuple(2));
        assert_ne!(a, b);
    }
}
