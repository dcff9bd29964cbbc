//! Local secp256k1 transaction signer.
//!
//! Produces EIP-155 replay-protected legacy transactions.

use crate::domain::{keccak256, Address, RelayError};
use crate::ports::{ChainError, SignedTransaction, TransactionSigner, UnsignedTransaction};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use primitive_types::U256;
use rlp::{Rlp, RlpStream};

/// Signs with a private key held in memory.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Load a signer from a hex private key.
    pub fn from_hex(private_key: &str) -> Result<Self, RelayError> {
        let bytes = hex::decode(private_key.trim_start_matches("0x"))
            .map_err(|_| RelayError::InvalidConfig("private key is not hex".to_string()))?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| {
            RelayError::InvalidConfig("private key is not a valid secp256k1 scalar".to_string())
        })?;
        let address = address_of(&key);
        Ok(Self { key, address })
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &format!("0x{}", hex::encode(self.address)))
            .finish_non_exhaustive()
    }
}

/// Account address for a signing key.
fn address_of(key: &SigningKey) -> Address {
    address_of_verifying(key.verifying_key())
}

fn address_of_verifying(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 prefix
    let hash = keccak256(&[&point.as_bytes()[1..]]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

fn append_body(stream: &mut RlpStream, tx: &UnsignedTransaction) {
    stream.append(&tx.nonce);
    stream.append(&tx.gas_price);
    stream.append(&tx.gas_limit);
    stream.append(&tx.to.to_vec());
    stream.append(&tx.value);
    stream.append(&tx.data);
}

/// EIP-155 signing hash: `keccak256(rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0]))`.
pub fn signing_hash(tx: &UnsignedTransaction) -> [u8; 32] {
    let mut stream = RlpStream::new_list(9);
    append_body(&mut stream, tx);
    stream.append(&tx.chain_id);
    stream.append(&0u8);
    stream.append(&0u8);
    let encoded = stream.out();
    keccak256(&[&encoded[..]])
}

impl TransactionSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_transaction(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, ChainError> {
        let hash = signing_hash(tx);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        // Low-S form; flipping S flips the y parity.
        let (signature, recovery_id) = match signature.normalize_s() {
            Some(normalized) => (
                normalized,
                RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
            ),
            None => (signature, recovery_id),
        };

        let bytes = signature.to_bytes();
        let r = U256::from_big_endian(&bytes[..32]);
        let s = U256::from_big_endian(&bytes[32..]);
        let v = u64::from(recovery_id.to_byte()) + 35 + 2 * tx.chain_id;

        let mut stream = RlpStream::new_list(9);
        append_body(&mut stream, tx);
        stream.append(&v);
        stream.append(&r);
        stream.append(&s);
        let raw = stream.out().to_vec();
        let hash = keccak256(&[raw.as_slice()]);

        Ok(SignedTransaction { raw, hash })
    }
}

fn rlp_err(field: &str, err: rlp::DecoderError) -> ChainError {
    ChainError::Signing(format!("invalid {}: {}", field, err))
}

/// Decode a signed EIP-155 legacy transaction and recover its sender.
pub fn recover_sender(raw: &[u8]) -> Result<(Address, UnsignedTransaction), ChainError> {
    let rlp = Rlp::new(raw);
    let count = rlp.item_count().map_err(|e| rlp_err("list", e))?;
    if count != 9 {
        return Err(ChainError::Signing(format!(
            "expected 9 transaction fields, got {}",
            count
        )));
    }

    let to: Vec<u8> = rlp.val_at(3).map_err(|e| rlp_err("to", e))?;
    let to: Address = to
        .try_into()
        .map_err(|_| ChainError::Signing("recipient is not 20 bytes".to_string()))?;
    let v: u64 = rlp.val_at(6).map_err(|e| rlp_err("v", e))?;
    if v < 35 {
        return Err(ChainError::Signing(format!(
            "v = {} is not EIP-155 encoded",
            v
        )));
    }
    let r: U256 = rlp.val_at(7).map_err(|e| rlp_err("r", e))?;
    let s: U256 = rlp.val_at(8).map_err(|e| rlp_err("s", e))?;

    let tx = UnsignedTransaction {
        chain_id: (v - 35) / 2,
        nonce: rlp.val_at(0).map_err(|e| rlp_err("nonce", e))?,
        gas_price: rlp.val_at(1).map_err(|e| rlp_err("gasPrice", e))?,
        gas_limit: rlp.val_at(2).map_err(|e| rlp_err("gas", e))?,
        to,
        value: rlp.val_at(4).map_err(|e| rlp_err("value", e))?,
        data: rlp.val_at(5).map_err(|e| rlp_err("data", e))?,
    };

    let mut sig_bytes = [0u8; 64];
    r.to_big_endian(&mut sig_bytes[..32]);
    s.to_big_endian(&mut sig_bytes[32..]);
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| ChainError::Signing(format!("invalid signature: {}", e)))?;
    let recovery_id = RecoveryId::try_from(((v - 35) % 2) as u8)
        .map_err(|e| ChainError::Signing(format!("invalid recovery id: {}", e)))?;

    let key = VerifyingKey::recover_from_prehash(&signing_hash(&tx), &signature, recovery_id)
        .map_err(|e| ChainError::Signing(format!("recovery failed: {}", e)))?;

    Ok((address_of_verifying(&key), tx))
}
