//! Contract types shared by every layer
//!
//! Types here appear in the persisted ledger layout and on the wire, so
//! their representation is part of the public contract.

pub mod timestamp;

pub use timestamp::Timestamp;
