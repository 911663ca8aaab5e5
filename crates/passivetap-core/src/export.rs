//! Line-oriented update serialization.
//!
//! Every writer here is byte-exact: fields are space-separated, rows end in
//! `\n`, and each section is terminated by one blank line. Output goes
//! through any [`io::Write`], so compression or anonymization is a wrapper
//! around the writer, not a concern of the writers themselves.

use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

use crate::aggregate::address_table::{AddressTable, MAC_TABLE_ENTRIES};
use crate::aggregate::dns_table::DnsTable;
use crate::aggregate::flow_table::FlowTable;
use crate::aggregate::series::PacketSeries;

/// Version stamp of the update layout. Bump only with a consumer-side
/// migration.
pub const UPDATE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write update record")]
    Io(#[from] io::Error),
}

/// IPv4 addresses are exported as unpadded lowercase hex of their
/// big-endian integer value.
fn ip_hex(ip: Ipv4Addr) -> String {
    format!("{:x}", u32::from(ip))
}

/// `<format_version> <sequence>` plus the section terminator.
pub fn write_update_header<W: io::Write>(writer: &mut W, sequence: u32) -> Result<(), ExportError> {
    writeln!(writer, "{} {}", UPDATE_FORMAT_VERSION, sequence)?;
    writeln!(writer)?;
    Ok(())
}

/// Series header (`<start_time_microseconds> <discarded>`) followed by one
/// `<offset> <size> <flow_id>` row per sample in arrival order.
pub fn write_series<W: io::Write>(writer: &mut W, series: &PacketSeries) -> Result<(), ExportError> {
    writeln!(
        writer,
        "{} {}",
        series.start_time_microseconds(),
        series.discarded_by_overflow()
    )?;
    for sample in series.samples() {
        writeln!(writer, "{} {} {}", sample.timestamp, sample.size, sample.flow)?;
    }
    writeln!(writer)?;
    Ok(())
}

/// Flow header (`<base> <dropped> <expired>`) followed by one row per
/// not-yet-exported live flow. Exported rows are omitted: the tuple-to-id
/// binding is immutable, so consumers already hold it.
pub fn write_flow_table<W: io::Write>(writer: &mut W, table: &FlowTable) -> Result<(), ExportError> {
    writeln!(
        writer,
        "{} {} {}",
        table.base_timestamp_seconds(),
        table.num_dropped_flows(),
        table.num_expired_flows()
    )?;
    for (flow_id, tuple) in table.pending_flows() {
        writeln!(
            writer,
            "{} {} {} {} {} {}",
            flow_id,
            ip_hex(tuple.ip_source),
            ip_hex(tuple.ip_destination),
            tuple.transport_protocol,
            tuple.port_source,
            tuple.port_destination
        )?;
    }
    writeln!(writer)?;
    Ok(())
}

/// A-record rows, then a blank line, then CNAME rows and a blank line.
pub fn write_dns_table<W: io::Write>(writer: &mut W, table: &DnsTable) -> Result<(), ExportError> {
    for record in table.a_records() {
        writeln!(
            writer,
            "{} {} {} {} {}",
            record.packet_id,
            record.address_id,
            record.domain_name,
            ip_hex(record.ip_address),
            record.ttl
        )?;
    }
    writeln!(writer)?;
    for record in table.cname_records() {
        writeln!(
            writer,
            "{} {} {} {} {}",
            record.packet_id,
            record.address_id,
            record.domain_name,
            record.cname,
            record.ttl
        )?;
    }
    writeln!(writer)?;
    Ok(())
}

/// Address header (`<first_identity> <capacity>`) followed by
/// `<mac_as_12_hex_digits> <ip_hex>` rows in identity order.
pub fn write_address_table<W: io::Write>(
    writer: &mut W,
    table: &AddressTable,
) -> Result<(), ExportError> {
    writeln!(writer, "{} {}", table.first_identity(), MAC_TABLE_ENTRIES)?;
    for (_, ip, mac) in table.entries() {
        let mut mac_hex = String::with_capacity(12);
        for byte in mac {
            mac_hex.push_str(&format!("{:02x}", byte));
        }
        writeln!(writer, "{} {}", mac_hex, ip_hex(ip))?;
    }
    writeln!(writer)?;
    Ok(())
}
