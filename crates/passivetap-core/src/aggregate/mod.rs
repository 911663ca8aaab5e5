//! Packet aggregation pipeline.
//!
//! The [`Aggregator`] owns all per-cycle state and drives one packet at a
//! time end to end: classify the frame, update the flow table, sample the
//! packet series, and feed DNS responses through the address table and the
//! DNS parser. [`Aggregator::write_update`] serializes everything and rolls
//! the state over to the next cycle.

pub mod address_table;
pub mod dns_table;
pub mod flow_table;
pub mod series;

use std::io;
use std::net::Ipv4Addr;

use etherparse::{LinkSlice, NetSlice, SlicedPacket, TransportSlice};
use log::{debug, info};
use pcap_parser::Linktype;
use thiserror::Error;

use crate::export::{
    write_address_table, write_dns_table, write_flow_table, write_series, write_update_header,
    ExportError,
};
use crate::protocols::dns::{process_dns_packet, DnsError};
use crate::source::PacketEvent;
use crate::whitelist::DomainOracle;
use crate::AggregateStats;

use address_table::{AddressTable, ETH_ALEN};
use dns_table::DnsTable;
use flow_table::{FlowId, FlowTable, FlowTableError, FlowTuple};
use series::{PacketSeries, SeriesError};

/// Source port identifying DNS response datagrams.
pub const DNS_PORT: u16 = 53;

/// RFC 1918 check: 10/8, 172.16/12, and 192.168/16.
pub fn is_address_private(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
}

/// What the pipeline did with one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Tracked as a flow and sampled into the series.
    Flow { flow_id: FlowId },
    /// Tracked, sampled, and committed as a DNS response.
    DnsResponse { flow_id: FlowId },
    /// Not an Ethernet IPv4 frame; nothing recorded.
    Ignored,
}

/// Per-packet failures. None of these is fatal: the packet is dropped with
/// no partial table writes, and the condition is visible in counters.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error(transparent)]
    Flow(#[from] FlowTableError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error("DNS response rejected: {0}")]
    Dns(#[from] DnsError),
}

struct ClassifiedPacket<'a> {
    tuple: FlowTuple,
    mac_source: [u8; ETH_ALEN],
    mac_destination: [u8; ETH_ALEN],
    ip_total_length: u16,
    /// UDP payload when the datagram came from the DNS port.
    dns_payload: Option<&'a [u8]>,
}

/// Owns the four tables and the update sequence; the single entry point of
/// the core.
pub struct Aggregator {
    flow_table: FlowTable,
    address_table: AddressTable,
    dns_table: DnsTable,
    series: PacketSeries,
    sequence: u32,
    packets_processed: u64,
    packets_ignored: u64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::build(DnsTable::new())
    }

    /// Aggregate with a domain oracle filtering DNS records on the commit
    /// path.
    pub fn with_whitelist(whitelist: Box<dyn DomainOracle + Send>) -> Self {
        Self::build(DnsTable::with_whitelist(whitelist))
    }

    fn build(dns_table: DnsTable) -> Self {
        Self {
            flow_table: FlowTable::new(),
            address_table: AddressTable::new(),
            dns_table,
            series: PacketSeries::new(),
            sequence: 0,
            packets_processed: 0,
            packets_ignored: 0,
        }
    }

    /// Drive one captured packet through the pipeline.
    ///
    /// Unclassifiable frames are counted and ignored. Table and parser
    /// failures surface as [`PacketError`]; the series sample for a packet
    /// with a malformed DNS payload is kept, since the packet itself was
    /// real traffic.
    pub fn handle_packet(&mut self, event: &PacketEvent) -> Result<PacketOutcome, PacketError> {
        self.packets_processed += 1;
        let classified = match classify_frame(event) {
            Some(classified) => classified,
            None => {
                self.packets_ignored += 1;
                debug!(
                    "ignoring unclassifiable frame ({} bytes, linktype {:?})",
                    event.frame.len(),
                    event.linktype
                );
                return Ok(PacketOutcome::Ignored);
            }
        };

        let flow_id = self
            .flow_table
            .process_flow(classified.tuple, event.timeval.sec)?;
        let packet_id = self
            .series
            .add_packet(event.timeval, classified.ip_total_length, flow_id)?;

        if let Some(payload) = classified.dns_payload {
            // The response travels toward the querying device, so the
            // private endpoint (destination when both qualify) names it.
            let (device_ip, device_mac) =
                if is_address_private(classified.tuple.ip_destination) {
                    (classified.tuple.ip_destination, classified.mac_destination)
                } else if is_address_private(classified.tuple.ip_source) {
                    (classified.tuple.ip_source, classified.mac_source)
                } else {
                    (classified.tuple.ip_destination, classified.mac_destination)
                };
            let address_id = self.address_table.lookup(device_ip, device_mac);
            process_dns_packet(payload, &mut self.dns_table, packet_id, address_id)?;
            return Ok(PacketOutcome::DnsResponse { flow_id });
        }

        Ok(PacketOutcome::Flow { flow_id })
    }

    /// Serialize one update record to `writer`, then roll state over to the
    /// next cycle: bump the sequence, reset the series and DNS table, mark
    /// flow rows exported, and rebase flow timestamps on `current_time`
    /// (seconds) so idle flows age out between packets.
    pub fn write_update<W: io::Write>(
        &mut self,
        writer: &mut W,
        current_time: i64,
    ) -> Result<(), ExportError> {
        write_update_header(writer, self.sequence)?;
        write_series(writer, &self.series)?;
        write_flow_table(writer, &self.flow_table)?;
        write_dns_table(writer, &self.dns_table)?;
        write_address_table(writer, &self.address_table)?;

        info!(
            "update {} written: {} samples, {} live flows, {} dns records",
            self.sequence,
            self.series.len(),
            self.flow_table.num_elements(),
            self.dns_table.a_records().len() + self.dns_table.cname_records().len()
        );

        self.sequence += 1;
        self.series.reset();
        self.dns_table.reset();
        self.flow_table.mark_exported();
        self.flow_table.advance_base_timestamp(current_time);
        Ok(())
    }

    /// Counter snapshot across all tables.
    pub fn stats(&self) -> AggregateStats {
        AggregateStats {
            packets_processed: self.packets_processed,
            packets_ignored: self.packets_ignored,
            updates_written: self.sequence,
            flows_live: self.flow_table.num_elements(),
            flows_dropped: self.flow_table.num_dropped_flows(),
            flows_expired: self.flow_table.num_expired_flows(),
            dns_a_records: self.dns_table.a_records().len(),
            dns_cname_records: self.dns_table.cname_records().len(),
            dns_records_suppressed: self.dns_table.num_suppressed(),
            dns_records_dropped: self.dns_table.num_dropped(),
            series_samples: self.series.len(),
            series_discarded: self.series.discarded_by_overflow(),
            addresses_tracked: self.address_table.len(),
        }
    }
}

/// Map a frame onto a five-tuple plus the link-layer addresses. Only
/// Ethernet II frames carrying IPv4 qualify; TCP and UDP contribute real
/// ports, any other transport reports port 0.
fn classify_frame(event: &PacketEvent) -> Option<ClassifiedPacket<'_>> {
    if event.linktype != Linktype::ETHERNET {
        return None;
    }
    let sliced = SlicedPacket::from_ethernet(&event.frame).ok()?;

    let ethernet = match sliced.link {
        Some(LinkSlice::Ethernet2(ethernet)) => ethernet,
        _ => return None,
    };
    let ipv4 = match sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => ipv4,
        _ => return None,
    };
    let header = ipv4.header();

    let (port_source, port_destination, dns_payload) = match sliced.transport {
        Some(TransportSlice::Udp(udp)) => {
            let payload = if udp.source_port() == DNS_PORT {
                Some(udp.payload())
            } else {
                None
            };
            (udp.source_port(), udp.destination_port(), payload)
        }
        Some(TransportSlice::Tcp(tcp)) => (tcp.source_port(), tcp.destination_port(), None),
        _ => (0, 0, None),
    };

    Some(ClassifiedPacket {
        tuple: FlowTuple {
            ip_source: header.source_addr(),
            ip_destination: header.destination_addr(),
            transport_protocol: header.protocol().0,
            port_source,
            port_destination,
        },
        mac_source: ethernet.source(),
        mac_destination: ethernet.destination(),
        ip_total_length: header.total_len(),
        dns_payload,
    })
}
