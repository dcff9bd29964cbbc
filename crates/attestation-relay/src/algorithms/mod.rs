//! # Algorithms Module
//!
//! Pure relay algorithms: buffer windows, event decoding, Merkle commitments.

pub mod buffer_clock;
pub mod leaf_codec;
pub mod merkle;

pub use buffer_clock::{buffer_index_for, is_buffer_expired, BufferClock};
pub use leaf_codec::{decode, decode_hex, encode_event, EVENT_HEX_LEN, EVENT_PAYLOAD_LEN};
pub use merkle::{
    build_merkle_proof, compute_merkle_root, verify_merkle_proof, MerkleTree, EMPTY_ROOT,
};
