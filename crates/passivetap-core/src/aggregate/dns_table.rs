use std::net::Ipv4Addr;

use thiserror::Error;

use crate::aggregate::address_table::AddressId;
use crate::protocols::dns::DnsResponse;
use crate::whitelist::DomainOracle;

/// Maximum A records retained per reporting cycle.
pub const DNS_TABLE_A_ENTRIES: usize = 512;
/// Maximum CNAME records retained per reporting cycle.
pub const DNS_TABLE_CNAME_ENTRIES: usize = 256;

/// An A resolution, tagged with the packet it came from and the identity of
/// the resolving device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsARecord {
    pub packet_id: u16,
    pub address_id: AddressId,
    pub domain_name: String,
    pub ip_address: Ipv4Addr,
    pub ttl: u32,
}

/// A CNAME resolution, tagged like [`DnsARecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsCnameRecord {
    pub packet_id: u16,
    pub address_id: AddressId,
    pub domain_name: String,
    pub cname: String,
    pub ttl: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DnsTableError {
    #[error("A record sequence at capacity")]
    ARecordsFull,
    #[error("CNAME record sequence at capacity")]
    CnameRecordsFull,
}

/// Bounded append-only store of extracted DNS resolutions.
///
/// Records accumulate until the exporter drains and resets the table; an
/// append past capacity is rejected and counted, never overwritten. An
/// optional domain oracle suppresses records for unlisted domains on the
/// packet-pipeline commit path.
pub struct DnsTable {
    a_records: Vec<DnsARecord>,
    cname_records: Vec<DnsCnameRecord>,
    whitelist: Option<Box<dyn DomainOracle + Send>>,
    num_suppressed: u32,
    num_dropped: u32,
}

impl Default for DnsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsTable {
    pub fn new() -> Self {
        Self {
            a_records: Vec::with_capacity(DNS_TABLE_A_ENTRIES),
            cname_records: Vec::with_capacity(DNS_TABLE_CNAME_ENTRIES),
            whitelist: None,
            num_suppressed: 0,
            num_dropped: 0,
        }
    }

    pub fn with_whitelist(whitelist: Box<dyn DomainOracle + Send>) -> Self {
        Self {
            whitelist: Some(whitelist),
            ..Self::new()
        }
    }

    pub fn add_a(&mut self, record: DnsARecord) -> Result<(), DnsTableError> {
        if self.a_records.len() >= DNS_TABLE_A_ENTRIES {
            return Err(DnsTableError::ARecordsFull);
        }
        self.a_records.push(record);
        Ok(())
    }

    pub fn add_cname(&mut self, record: DnsCnameRecord) -> Result<(), DnsTableError> {
        if self.cname_records.len() >= DNS_TABLE_CNAME_ENTRIES {
            return Err(DnsTableError::CnameRecordsFull);
        }
        self.cname_records.push(record);
        Ok(())
    }

    /// Commit every record of a parsed response, tagged with the packet id
    /// and the resolving device's identity. Whitelist suppression and
    /// capacity exhaustion are counted, not errors: the parser has already
    /// vouched for the packet, and dropping a record is steady-state
    /// behavior under load.
    pub fn record_response(
        &mut self,
        packet_id: u16,
        address_id: AddressId,
        response: &DnsResponse,
    ) {
        for answer in &response.a_records {
            if !self.admits(&answer.domain_name) {
                self.num_suppressed += 1;
                continue;
            }
            let record = DnsARecord {
                packet_id,
                address_id,
                domain_name: answer.domain_name.clone(),
                ip_address: answer.ip_address,
                ttl: answer.ttl,
            };
            if self.add_a(record).is_err() {
                self.num_dropped += 1;
            }
        }
        for answer in &response.cname_records {
            if !self.admits(&answer.domain_name) {
                self.num_suppressed += 1;
                continue;
            }
            let record = DnsCnameRecord {
                packet_id,
                address_id,
                domain_name: answer.domain_name.clone(),
                cname: answer.cname.clone(),
                ttl: answer.ttl,
            };
            if self.add_cname(record).is_err() {
                self.num_dropped += 1;
            }
        }
    }

    fn admits(&self, domain_name: &str) -> bool {
        match &self.whitelist {
            Some(oracle) => oracle.is_whitelisted(domain_name),
            None => true,
        }
    }

    /// Drop accumulated records after an export cycle. Suppression and drop
    /// counters are cumulative and survive the reset.
    pub fn reset(&mut self) {
        self.a_records.clear();
        self.cname_records.clear();
    }

    pub fn a_records(&self) -> &[DnsARecord] {
        &self.a_records
    }

    pub fn cname_records(&self) -> &[DnsCnameRecord] {
        &self.cname_records
    }

    pub fn num_suppressed(&self) -> u32 {
        self.num_suppressed
    }

    pub fn num_dropped(&self) -> u32 {
        self.num_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::dns::{DnsAAnswer, DnsCnameAnswer};
    use crate::whitelist::DomainWhitelist;

    fn a_record(packet_id: u16, address_id: AddressId, domain: &str, ip: u32, ttl: u32) -> DnsARecord {
        DnsARecord {
            packet_id,
            address_id,
            domain_name: domain.to_string(),
            ip_address: Ipv4Addr::from(ip),
            ttl,
        }
    }

    #[test]
    fn a_records_append_in_order() {
        let mut table = DnsTable::new();
        table.add_a(a_record(2, 1, "foo.com", 1234, 12345)).unwrap();
        table.add_a(a_record(4, 2, "bar.com", 4321, 54321)).unwrap();

        assert_eq!(table.a_records()[0], a_record(2, 1, "foo.com", 1234, 12345));
        assert_eq!(table.a_records()[1], a_record(4, 2, "bar.com", 4321, 54321));
    }

    #[test]
    fn cname_records_append_in_order() {
        let mut table = DnsTable::new();
        table
            .add_cname(DnsCnameRecord {
                packet_id: 8,
                address_id: 1,
                domain_name: "foo.com".to_string(),
                cname: "gorp.org".to_string(),
                ttl: 123,
            })
            .unwrap();
        table
            .add_cname(DnsCnameRecord {
                packet_id: 10,
                address_id: 2,
                domain_name: "bar.com".to_string(),
                cname: "baz.net".to_string(),
                ttl: 321,
            })
            .unwrap();

        assert_eq!(table.cname_records()[0].cname, "gorp.org");
        assert_eq!(table.cname_records()[1].packet_id, 10);
        assert_eq!(table.cname_records()[1].ttl, 321);
    }

    #[test]
    fn capacity_is_enforced_per_sequence() {
        let mut table = DnsTable::new();
        for n in 0..DNS_TABLE_A_ENTRIES {
            table.add_a(a_record(n as u16, 0, "foo.com", 1, 1)).unwrap();
        }
        assert_eq!(
            table.add_a(a_record(0, 0, "foo.com", 1, 1)),
            Err(DnsTableError::ARecordsFull)
        );
        assert_eq!(table.a_records().len(), DNS_TABLE_A_ENTRIES);

        for _ in 0..DNS_TABLE_CNAME_ENTRIES {
            table
                .add_cname(DnsCnameRecord {
                    packet_id: 0,
                    address_id: 0,
                    domain_name: "foo.com".to_string(),
                    cname: "bar.com".to_string(),
                    ttl: 1,
                })
                .unwrap();
        }
        assert_eq!(
            table.add_cname(DnsCnameRecord {
                packet_id: 0,
                address_id: 0,
                domain_name: "foo.com".to_string(),
                cname: "bar.com".to_string(),
                ttl: 1,
            }),
            Err(DnsTableError::CnameRecordsFull)
        );
    }

    #[test]
    fn whitelist_suppresses_unlisted_domains() {
        let whitelist = DomainWhitelist::parse("foo.com");
        let mut table = DnsTable::with_whitelist(Box::new(whitelist));
        let response = DnsResponse {
            id: 7,
            a_records: vec![
                DnsAAnswer {
                    domain_name: "www.foo.com".to_string(),
                    ip_address: Ipv4Addr::new(1, 2, 3, 4),
                    ttl: 60,
                },
                DnsAAnswer {
                    domain_name: "tracker.example".to_string(),
                    ip_address: Ipv4Addr::new(5, 6, 7, 8),
                    ttl: 60,
                },
            ],
            cname_records: vec![DnsCnameAnswer {
                domain_name: "cdn.elsewhere.net".to_string(),
                cname: "edge.elsewhere.net".to_string(),
                ttl: 60,
            }],
        };

        table.record_response(3, 9, &response);
        assert_eq!(table.a_records().len(), 1);
        assert_eq!(table.a_records()[0].domain_name, "www.foo.com");
        assert_eq!(table.a_records()[0].packet_id, 3);
        assert_eq!(table.a_records()[0].address_id, 9);
        assert!(table.cname_records().is_empty());
        assert_eq!(table.num_suppressed(), 2);
    }

    #[test]
    fn reset_drops_records_but_keeps_counters() {
        let mut table = DnsTable::new();
        table.add_a(a_record(1, 1, "foo.com", 1, 1)).unwrap();
        table.reset();
        assert!(table.a_records().is_empty());
        assert!(table.cname_records().is_empty());
    }
}
