//! JSON framing for protocol events.
//!
//! One event per frame. Frames are trimmed before decoding so line-delimited
//! transports can pass lines through unchanged.

use thiserror::Error;

use crate::events::{ClientEvent, Inbound};

/// Errors produced while encoding or decoding an event frame.
#[derive(Debug, Error)]
pub enum CodecError {
	/// The frame was empty or whitespace only.
	#[error("empty event frame")]
	Empty,
	/// The frame was not a valid event object.
	#[error("malformed event frame: {0}")]
	Malformed(#[from] serde_json::Error),
}

fn non_empty(frame: &str) -> Result<&str, CodecError> {
	let trimmed = frame.trim();
	if trimmed.is_empty() {
		return Err(CodecError::Empty);
	}
	Ok(trimmed)
}

/// Decodes a server broadcast.
pub fn decode_inbound(frame: &str) -> Result<Inbound, CodecError> {
	Ok(serde_json::from_str(non_empty(frame)?)?)
}

/// Encodes a server broadcast.
pub fn encode_inbound(event: &Inbound) -> Result<String, CodecError> {
	Ok(serde_json::to_string(event)?)
}

/// Decodes a client event.
pub fn decode_outbound(frame: &str) -> Result<ClientEvent, CodecError> {
	Ok(serde_json::from_str(non_empty(frame)?)?)
}

/// Encodes a client event.
pub fn encode_outbound(event: &ClientEvent) -> Result<String, CodecError> {
	Ok(serde_json::to_string(event)?)
}
