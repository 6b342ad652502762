//! Host-facing contract and JSON bridge for the native shell that owns the
//! OS notification facility.

pub mod channel;
pub mod contract;
pub mod stdio;
