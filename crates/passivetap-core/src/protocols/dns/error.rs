use std::fmt;

use thiserror::Error;

/// Resource-record section a validation failure was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSection {
    Answer,
    Authority,
    Additional,
}

impl fmt::Display for RecordSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordSection::Answer => "answer",
            RecordSection::Authority => "authority",
            RecordSection::Additional => "additional",
        };
        f.write_str(name)
    }
}

/// Errors returned by DNS response validation.
///
/// Every malformed-input condition is a distinct, recoverable kind; none of
/// them mutates the DNS table, and none is fatal to the monitor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DnsError {
    #[error("truncated DNS header: need {needed} bytes, got {actual}")]
    TruncatedHeader { needed: usize, actual: usize },
    #[error("not a DNS response")]
    NotResponse,
    #[error("truncated question section")]
    TruncatedQuestion,
    #[error("invalid domain name encoding")]
    InvalidName,
    #[error("truncated {section} record header")]
    TruncatedRecordHeader { section: RecordSection },
    #[error("{section} record data overruns message: declared {declared} bytes, {remaining} remain")]
    RecordOverrun {
        section: RecordSection,
        declared: usize,
        remaining: usize,
    },
    #[error("{section} A record carries no IPv4 address")]
    MissingRecordAddress { section: RecordSection },
}
