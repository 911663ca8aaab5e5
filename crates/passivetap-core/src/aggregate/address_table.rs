use std::net::Ipv4Addr;

/// Number of device mappings kept; identities therefore fit in a `u8`.
pub const MAC_TABLE_ENTRIES: usize = 256;

pub type AddressId = u8;

/// Length of a link-layer (MAC) address.
pub const ETH_ALEN: usize = 6;

#[derive(Debug, Clone)]
struct AddressEntry {
    ip: Ipv4Addr,
    mac: [u8; ETH_ALEN],
    last_access: u64,
}

/// Maps an observed (IPv4, MAC) pair to a small stable identity.
///
/// The identity is the slot index, which makes it a bookkeeping key rather
/// than a durable device fingerprint: when a full table evicts its
/// least-recently-accessed pair, the newcomer inherits the freed slot and
/// with it the identity. Distinct pairs hold distinct identities while
/// simultaneously live. Recency is refreshed on every lookup, hit or
/// insert.
pub struct AddressTable {
    slots: Vec<Option<AddressEntry>>,
    access_counter: u64,
}

impl Default for AddressTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAC_TABLE_ENTRIES],
            access_counter: 0,
        }
    }

    /// Find or create the identity for an (IPv4, MAC) pair. Never fails: a
    /// full table evicts exactly one pair to admit the new one.
    pub fn lookup(&mut self, ip: Ipv4Addr, mac: [u8; ETH_ALEN]) -> AddressId {
        self.access_counter += 1;
        let stamp = self.access_counter;

        let mut oldest: Option<(usize, u64)> = None;
        let mut free = None;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                Some(entry) => {
                    if entry.ip == ip && entry.mac == mac {
                        entry.last_access = stamp;
                        return index as AddressId;
                    }
                    if oldest.map_or(true, |(_, access)| entry.last_access < access) {
                        oldest = Some((index, entry.last_access));
                    }
                }
                None => {
                    if free.is_none() {
                        free = Some(index);
                    }
                }
            }
        }

        let index = match free {
            Some(index) => index,
            // Table full: reuse the least-recently-accessed slot.
            None => oldest.map(|(index, _)| index).unwrap_or(0),
        };
        self.slots[index] = Some(AddressEntry {
            ip,
            mac,
            last_access: stamp,
        });
        index as AddressId
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    /// Live entries in identity order.
    pub fn entries(&self) -> impl Iterator<Item = (AddressId, Ipv4Addr, [u8; ETH_ALEN])> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref()
                    .map(|entry| (index as AddressId, entry.ip, entry.mac))
            })
    }

    /// Identity of the first exported entry; 0 when the table is empty.
    pub fn first_identity(&self) -> AddressId {
        self.entries().next().map(|(id, _, _)| id).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_pairs_get_distinct_identities() {
        let mut table = AddressTable::new();
        let first_mac = *b"abcdef";
        let second_mac = *b"123456";
        let first_ip = Ipv4Addr::from(0x0a00_0001);
        let second_ip = Ipv4Addr::from(0x0a65_4321);

        let first_id = table.lookup(first_ip, first_mac);
        let second_id = table.lookup(second_ip, second_mac);
        assert_ne!(first_id, second_id);

        assert_eq!(table.lookup(first_ip, first_mac), first_id);
        assert_eq!(table.lookup(second_ip, second_mac), second_id);

        // Mixing the halves of two known pairs is a new pair.
        let crossed = table.lookup(second_ip, first_mac);
        assert_ne!(crossed, first_id);
        assert_ne!(crossed, second_id);
        let crossed = table.lookup(first_ip, second_mac);
        assert_ne!(crossed, first_id);
        assert_ne!(crossed, second_id);

        assert_eq!(table.lookup(first_ip, first_mac), first_id);
        assert_eq!(table.lookup(second_ip, second_mac), second_id);
    }

    #[test]
    fn eviction_reuses_the_oldest_slot() {
        let mut table = AddressTable::new();
        let mac = [1, 2, 3, 4, 5, 0];
        let mut ip = 0x0a12_3456u32;

        let first_id = table.lookup(Ipv4Addr::from(ip), mac);
        assert_eq!(table.lookup(Ipv4Addr::from(ip), mac), first_id);

        for _ in 1..MAC_TABLE_ENTRIES {
            ip += 1;
            table.lookup(Ipv4Addr::from(ip), mac);
        }
        assert_eq!(table.len(), MAC_TABLE_ENTRIES);

        // The table is full; the next pair evicts the least recently
        // accessed entry and inherits its identity.
        ip += 1;
        assert_eq!(table.lookup(Ipv4Addr::from(ip), mac), first_id);

        let another_id = table.lookup(Ipv4Addr::from(12345u32), mac);
        assert_ne!(another_id, first_id);
    }

    #[test]
    fn lookups_refresh_recency() {
        let mut table = AddressTable::new();
        let mac = [9, 9, 9, 9, 9, 9];
        let protected = table.lookup(Ipv4Addr::from(1u32), mac);

        for n in 2..=MAC_TABLE_ENTRIES as u32 {
            table.lookup(Ipv4Addr::from(n), mac);
        }
        // Touch the first pair so it is no longer the LRU victim.
        assert_eq!(table.lookup(Ipv4Addr::from(1u32), mac), protected);

        let newcomer = table.lookup(Ipv4Addr::from(0xffff_ffffu32), mac);
        assert_ne!(newcomer, protected);
        assert_eq!(table.lookup(Ipv4Addr::from(1u32), mac), protected);
    }

    #[test]
    fn first_identity_tracks_the_lowest_live_slot() {
        let mut table = AddressTable::new();
        assert_eq!(table.first_identity(), 0);
        table.lookup(Ipv4Addr::from(1u32), [0; ETH_ALEN]);
        assert_eq!(table.first_identity(), 0);
    }
}
