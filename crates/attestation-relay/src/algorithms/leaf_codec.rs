//! # Leaf Codec
//!
//! Decodes `AttestationRequest` event payloads into attestation leaves.
//!
//! ## Payload layout
//!
//! ```text
//! offset  width  field
//! 0       32     buffer timestamp (uint256, big endian)
//! 32      32     instruction selector
//! 64      32     request id
//! 96      32     data-availability proof
//! ```
//!
//! Hex-encoded, that is `0x` followed by 256 hex characters (258 in total).

use super::buffer_clock::BufferClock;
use crate::domain::{AttestationLeaf, Hash, RelayError};

/// Width of one ABI word.
pub const WORD_LEN: usize = 32;

/// Minimum raw payload length.
pub const EVENT_PAYLOAD_LEN: usize = 4 * WORD_LEN;

/// Minimum hex payload length, including the `0x` prefix.
pub const EVENT_HEX_LEN: usize = 2 + 2 * EVENT_PAYLOAD_LEN;

fn word(raw: &[u8], index: usize) -> Hash {
    let mut out = [0u8; WORD_LEN];
    out.copy_from_slice(&raw[index * WORD_LEN..(index + 1) * WORD_LEN]);
    out
}

/// Decode a raw event payload emitted in `source_block`.
pub fn decode(
    raw: &[u8],
    source_block: u64,
    clock: &BufferClock,
) -> Result<AttestationLeaf, RelayError> {
    if raw.len() < EVENT_PAYLOAD_LEN {
        return Err(RelayError::MalformedEvent {
            block: source_block,
            reason: format!(
                "payload is {} bytes, expected at least {}",
                raw.len(),
                EVENT_PAYLOAD_LEN
            ),
        });
    }

    let timestamp_word = word(raw, 0);
    if timestamp_word[..24].iter().any(|b| *b != 0) {
        return Err(RelayError::MalformedEvent {
            block: source_block,
            reason: "buffer timestamp does not fit in 64 bits".to_string(),
        });
    }
    let mut ts_bytes = [0u8; 8];
    ts_bytes.copy_from_slice(&timestamp_word[24..]);
    let timestamp = u64::from_be_bytes(ts_bytes);

    let buffer_index = clock
        .index_for(timestamp)
        .map_err(|e| RelayError::MalformedEvent {
            block: source_block,
            reason: e.to_string(),
        })?;

    Ok(AttestationLeaf {
        buffer_index,
        instruction_selector: word(raw, 1),
        request_id: word(raw, 2),
        data_availability_proof: word(raw, 3),
        source_block,
    })
}

/// Decode a `0x`-prefixed hex event payload emitted in `source_block`.
pub fn decode_hex(
    data: &str,
    source_block: u64,
    clock: &BufferClock,
) -> Result<AttestationLeaf, RelayError> {
    if data.len() < EVENT_HEX_LEN {
        return Err(RelayError::MalformedEvent {
            block: source_block,
            reason: format!(
                "payload is {} hex chars, expected at least {}",
                data.len(),
                EVENT_HEX_LEN
            ),
        });
    }
    let raw = hex::decode(data.trim_start_matches("0x")).map_err(|e| {
        RelayError::MalformedEvent {
            block: source_block,
            reason: format!("payload is not hex: {}", e),
        }
    })?;
    decode(&raw, source_block, clock)
}

/// Encode an event payload with the layout `decode` expects.
pub fn encode_event(
    timestamp: u64,
    instruction_selector: &Hash,
    request_id: &Hash,
    data_availability_proof: &Hash,
) -> Vec<u8> {
    let mut raw = Vec::with_capacity(EVENT_PAYLOAD_LEN);
    raw.extend_from_slice(&crate::domain::u256_word(timestamp));
    raw.extend_from_slice(instruction_selector);
    raw.extend_from_slice(request_id);
    raw.extend_from_slice(data_availability_proof);
    raw
}
