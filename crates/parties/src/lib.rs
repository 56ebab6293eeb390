//! Parties domain module: clients and their lead records.
//!
//! The fulfillment engine only needs one policy input from this area: whether
//! the client behind a booking is a **cold lead**, in which case no stock may
//! be committed against them.

pub mod client;
pub mod lead;

pub use client::Client;
pub use lead::LeadPriority;
