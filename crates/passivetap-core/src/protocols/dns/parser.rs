use std::net::Ipv4Addr;

use crate::aggregate::address_table::AddressId;
use crate::aggregate::dns_table::DnsTable;

use super::error::{DnsError, RecordSection};
use super::layout;
use super::reader::{DnsReader, NameError};

/// An A record extracted from a response, before table tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAAnswer {
    pub domain_name: String,
    pub ip_address: Ipv4Addr,
    pub ttl: u32,
}

/// A CNAME record extracted from a response, before table tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsCnameAnswer {
    pub domain_name: String,
    pub cname: String,
    pub ttl: u32,
}

/// Fully validated response with every extracted resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsResponse {
    pub id: u16,
    pub a_records: Vec<DnsAAnswer>,
    pub cname_records: Vec<DnsCnameAnswer>,
}

/// Validate `message` as a DNS response and extract its A and CNAME
/// records.
///
/// Pure over the byte buffer: every declared length is checked against the
/// remaining bytes before use, and each failure mode is a distinct
/// [`DnsError`]. The answer, authority, and additional sections are all
/// walked; A/CNAME records are collected from the answer and additional
/// sections (authority records are validated and skipped).
pub fn parse_dns_response(message: &[u8]) -> Result<DnsResponse, DnsError> {
    if message.len() < layout::HEADER_LEN {
        return Err(DnsError::TruncatedHeader {
            needed: layout::HEADER_LEN,
            actual: message.len(),
        });
    }

    let id = field_u16(message, layout::ID_RANGE);
    let flags = field_u16(message, layout::FLAGS_RANGE);
    if flags & layout::FLAG_RESPONSE == 0 {
        return Err(DnsError::NotResponse);
    }
    let qdcount = field_u16(message, layout::QDCOUNT_RANGE);
    let ancount = field_u16(message, layout::ANCOUNT_RANGE);
    let nscount = field_u16(message, layout::NSCOUNT_RANGE);
    let arcount = field_u16(message, layout::ARCOUNT_RANGE);

    let mut reader = DnsReader::new(message);
    reader.skip(layout::HEADER_LEN).ok_or(DnsError::TruncatedHeader {
        needed: layout::HEADER_LEN,
        actual: message.len(),
    })?;

    for _ in 0..qdcount {
        reader.read_name().map_err(|err| match err {
            NameError::Truncated => DnsError::TruncatedQuestion,
            NameError::Malformed => DnsError::InvalidName,
        })?;
        reader
            .skip(layout::QUESTION_FIXED_LEN)
            .ok_or(DnsError::TruncatedQuestion)?;
    }

    let mut response = DnsResponse {
        id,
        a_records: Vec::new(),
        cname_records: Vec::new(),
    };
    walk_records(&mut reader, ancount, RecordSection::Answer, Some(&mut response))?;
    walk_records(&mut reader, nscount, RecordSection::Authority, None)?;
    walk_records(
        &mut reader,
        arcount,
        RecordSection::Additional,
        Some(&mut response),
    )?;
    Ok(response)
}

/// Parse a DNS response and, on success, commit every extracted record to
/// the table tagged with `packet_id` and `address_id`. All-or-nothing: any
/// validation failure leaves the table untouched.
pub fn process_dns_packet(
    message: &[u8],
    table: &mut DnsTable,
    packet_id: u16,
    address_id: AddressId,
) -> Result<(), DnsError> {
    let response = parse_dns_response(message)?;
    table.record_response(packet_id, address_id, &response);
    Ok(())
}

fn walk_records(
    reader: &mut DnsReader<'_>,
    count: u16,
    section: RecordSection,
    mut sink: Option<&mut DnsResponse>,
) -> Result<(), DnsError> {
    for _ in 0..count {
        let domain_name = reader.read_name().map_err(|err| match err {
            NameError::Truncated => DnsError::TruncatedRecordHeader { section },
            NameError::Malformed => DnsError::InvalidName,
        })?;
        let record_type = reader
            .read_u16()
            .ok_or(DnsError::TruncatedRecordHeader { section })?;
        let class = reader
            .read_u16()
            .ok_or(DnsError::TruncatedRecordHeader { section })?;
        let ttl = reader
            .read_u32()
            .ok_or(DnsError::TruncatedRecordHeader { section })?;
        let rdlength = reader
            .read_u16()
            .ok_or(DnsError::TruncatedRecordHeader { section })? as usize;
        if rdlength > reader.remaining() {
            return Err(DnsError::RecordOverrun {
                section,
                declared: rdlength,
                remaining: reader.remaining(),
            });
        }

        let collect = sink.is_some() && class == layout::CLASS_IN;
        if collect && record_type == layout::TYPE_A {
            if rdlength != layout::A_RDATA_LEN {
                return Err(DnsError::MissingRecordAddress { section });
            }
            let octets = reader
                .read_slice(layout::A_RDATA_LEN)
                .ok_or(DnsError::MissingRecordAddress { section })?;
            if let Some(out) = sink.as_deref_mut() {
                out.a_records.push(DnsAAnswer {
                    domain_name,
                    ip_address: Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
                    ttl,
                });
            }
        } else if collect && record_type == layout::TYPE_CNAME {
            // The canonical name may use compression into earlier bytes, so
            // decode through a forked reader and step over the rdata.
            let mut rdata = reader.clone();
            let cname = rdata.read_name().map_err(|_| DnsError::InvalidName)?;
            reader.skip(rdlength).ok_or(DnsError::RecordOverrun {
                section,
                declared: rdlength,
                remaining: reader.remaining(),
            })?;
            if let Some(out) = sink.as_deref_mut() {
                out.cname_records.push(DnsCnameAnswer {
                    domain_name,
                    cname,
                    ttl,
                });
            }
        } else {
            // Length already checked against the remaining buffer.
            reader.skip(rdlength).ok_or(DnsError::RecordOverrun {
                section,
                declared: rdlength,
                remaining: reader.remaining(),
            })?;
        }
    }
    Ok(())
}

fn field_u16(message: &[u8], range: std::ops::Range<usize>) -> u16 {
    u16::from_be_bytes([message[range.start], message[range.start + 1]])
}
