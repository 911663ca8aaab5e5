//! Application-layer protocol decoders fed by the packet pipeline.

pub mod dns;
