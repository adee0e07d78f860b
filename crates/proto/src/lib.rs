//! Wire types for the trellis flow-graph collaboration protocol.
//!
//! This crate defines the records and events exchanged between an editor
//! session and the flow server. Events travel as JSON objects tagged by a
//! `"type"` field. Inbound broadcasts may carry `"self": true` when they echo
//! an event this session sent earlier.

#![warn(missing_docs)]

pub mod codec;
pub mod events;
pub mod types;

pub use codec::{CodecError, decode_inbound, decode_outbound, encode_inbound, encode_outbound};
pub use events::{ClientEvent, Inbound, ServerEvent};
pub use types::*;
