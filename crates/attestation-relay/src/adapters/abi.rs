//! State connector contract ABI encoding.

use crate::domain::{keccak256, u256_word, SubmissionPayload};
use crate::ports::CallEncoder;

/// Selector of `requestAttestations` intercepted by the node's state
/// connector precompile. It is fixed by the node, not derived from a
/// signature.
pub const REQUEST_ATTESTATIONS_SELECTOR: [u8; 4] = [0x06, 0x95, 0xef, 0x28];

/// Signature of the buffer root entry point.
pub const SUBMIT_ATTESTATION_SIGNATURE: &str = "submitAttestation(uint256,bytes32)";

/// First four bytes of `keccak256(signature)`.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(&[signature.as_bytes()]);
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encodes relay submissions as state connector calls.
///
/// Every argument is a static 32-byte word, so the call data is the
/// selector followed by the words in order.
#[derive(Clone, Copy, Debug)]
pub struct StateConnectorAbi {
    request_selector: [u8; 4],
    submit_selector: [u8; 4],
}

impl StateConnectorAbi {
    /// Encoder for the standard entry points.
    pub fn new() -> Self {
        Self::with_request_selector(REQUEST_ATTESTATIONS_SELECTOR)
    }

    /// Encoder sending requests to `request_selector`.
    pub fn with_request_selector(request_selector: [u8; 4]) -> Self {
        Self {
            request_selector,
            submit_selector: function_selector(SUBMIT_ATTESTATION_SIGNATURE),
        }
    }

    /// Selector used for attestation requests.
    pub fn request_selector(&self) -> [u8; 4] {
        self.request_selector
    }
}

impl Default for StateConnectorAbi {
    fn default() -> Self {
        Self::new()
    }
}

impl CallEncoder for StateConnectorAbi {
    fn encode(&self, payload: &SubmissionPayload) -> Vec<u8> {
        match payload {
            SubmissionPayload::Request(request) => {
                let mut data = Vec::with_capacity(4 + 3 * 32);
                data.extend_from_slice(&self.request_selector);
                data.extend_from_slice(&request.instruction_selector);
                data.extend_from_slice(&request.request_id);
                data.extend_from_slice(&request.data_availability_proof);
                data
            }
            SubmissionPayload::BufferRoot { buffer_index, root } => {
                let mut data = Vec::with_capacity(4 + 2 * 32);
                data.extend_from_slice(&self.submit_selector);
                data.extend_from_slice(&u256_word(*buffer_index));
                data.extend_from_slice(root);
                data
            }
        }
    }
}
