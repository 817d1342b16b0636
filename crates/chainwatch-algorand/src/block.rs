//! Minimal Algorand block model and deterministic msgpack decoding.
//!
//! Only the fields the matchers need are modeled. Field renames follow the
//! canonical short msgpack keys; defaults + skip-if-empty mirror the
//! omit-empty encoding convention, which keeps re-encoding (for transaction
//! ids) stable. Fields are declared in sorted key order for the same reason.

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha512_256};

use chainwatch_core::WatchError;

/// Transaction type tag for application calls.
pub const TX_TYPE_APP_CALL: &str = "appl";
/// Transaction type tag for asset transfers.
pub const TX_TYPE_ASSET_TRANSFER: &str = "axfer";

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn is_empty_bytes(b: &ByteBuf) -> bool {
    b.is_empty()
}

/// The envelope returned by `GET /v2/blocks/{round}?format=msgpack`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockResponse {
    #[serde(rename = "block", default)]
    pub block: Block,
}

/// Block header fields plus the payset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "gen", default, skip_serializing_if = "String::is_empty")]
    pub genesis_id: String,
    #[serde(rename = "gh", default, skip_serializing_if = "is_empty_bytes")]
    pub genesis_hash: ByteBuf,
    /// Hash of the previous block, the reorg-detection anchor.
    #[serde(rename = "prev", default, skip_serializing_if = "is_empty_bytes")]
    pub previous_block_hash: ByteBuf,
    #[serde(rename = "rnd", default, skip_serializing_if = "is_zero_u64")]
    pub round: u64,
    #[serde(rename = "ts", default, skip_serializing_if = "is_zero_i64")]
    pub timestamp: i64,
    #[serde(rename = "txns", default, skip_serializing_if = "Vec::is_empty")]
    pub payset: Vec<SignedTxnInBlock>,
}

/// A transaction in a block, with the apply-data fields the matchers read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignedTxnInBlock {
    /// ApplyData: asset closing amount.
    #[serde(rename = "aca", default, skip_serializing_if = "is_zero_u64")]
    pub asset_closing_amount: u64,
    /// ApplyData: application id allocated by an app-create transaction.
    #[serde(rename = "apid", default, skip_serializing_if = "is_zero_u64")]
    pub application_id: u64,
    #[serde(rename = "hgi", default, skip_serializing_if = "std::ops::Not::not")]
    pub has_genesis_id: bool,
    /// ApplyData: close rewards.
    #[serde(rename = "rc", default, skip_serializing_if = "is_zero_u64")]
    pub close_rewards: u64,
    #[serde(rename = "sig", default, skip_serializing_if = "is_empty_bytes")]
    pub sig: ByteBuf,
    #[serde(rename = "txn", default)]
    pub txn: Transaction,
}

/// The transaction fields shared by application calls and asset transfers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "aamt", default, skip_serializing_if = "is_zero_u64")]
    pub asset_amount: u64,
    #[serde(rename = "aclose", default, skip_serializing_if = "is_empty_bytes")]
    pub asset_close_to: ByteBuf,
    #[serde(rename = "apaa", default, skip_serializing_if = "Vec::is_empty")]
    pub application_args: Vec<ByteBuf>,
    #[serde(rename = "apan", default, skip_serializing_if = "is_zero_u64")]
    pub on_completion: u64,
    #[serde(rename = "apas", default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_assets: Vec<u64>,
    #[serde(rename = "apat", default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<ByteBuf>,
    #[serde(rename = "apfa", default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_apps: Vec<u64>,
    #[serde(rename = "apid", default, skip_serializing_if = "is_zero_u64")]
    pub application_id: u64,
    #[serde(rename = "arcv", default, skip_serializing_if = "is_empty_bytes")]
    pub asset_receiver: ByteBuf,
    #[serde(rename = "asnd", default, skip_serializing_if = "is_empty_bytes")]
    pub asset_sender: ByteBuf,
    #[serde(rename = "snd", default, skip_serializing_if = "is_empty_bytes")]
    pub sender: ByteBuf,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub tx_type: String,
    #[serde(rename = "xaid", default, skip_serializing_if = "is_zero_u64")]
    pub xfer_asset: u64,
}

/// Decode a raw msgpack block response.
pub fn decode_block(raw: &[u8]) -> Result<Block, WatchError> {
    let resp: BlockResponse = rmp_serde::from_slice(raw)
        .map_err(|e| WatchError::Decode(format!("decode block: {e}")))?;
    Ok(resp.block)
}

/// Deterministic transaction id: SHA-512/256 over `"TX" || msgpack(txn)`,
/// rendered in unpadded base32.
pub fn transaction_id(txn: &Transaction) -> Result<String, WatchError> {
    let encoded = rmp_serde::to_vec_named(txn)
        .map_err(|e| WatchError::Decode(format!("encode txn: {e}")))?;
    let mut hasher = Sha512_256::new();
    hasher.update(b"TX");
    hasher.update(&encoded);
    Ok(BASE32_NOPAD.encode(&hasher.finalize()))
}

/// Canonical rendering of a 32-byte digest (block hashes, parent hashes).
pub fn digest_to_string(bytes: &[u8]) -> String {
    BASE32_NOPAD.encode(bytes)
}

/// Render a 32-byte public key as an Algorand address: base32 over
/// `pk || sha512_256(pk)[28..]`. Short input is zero-padded.
pub fn encode_address(pk: &[u8]) -> String {
    let mut key = [0u8; 32];
    let n = pk.len().min(32);
    key[..n].copy_from_slice(&pk[..n]);

    let checksum = Sha512_256::digest(key);
    let mut full = [0u8; 36];
    full[..32].copy_from_slice(&key);
    full[32..].copy_from_slice(&checksum[28..]);
    BASE32_NOPAD.encode(&full)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn app_call_txn() -> Transaction {
        Transaction {
            tx_type: TX_TYPE_APP_CALL.into(),
            sender: ByteBuf::from(vec![7u8; 32]),
            application_id: 123,
            application_args: vec![ByteBuf::from(b"hello".to_vec())],
            ..Default::default()
        }
    }

    #[test]
    fn block_roundtrips_through_msgpack() {
        let block = Block {
            round: 9,
            previous_block_hash: ByteBuf::from(vec![1u8; 32]),
            payset: vec![SignedTxnInBlock {
                txn: app_call_txn(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let raw = rmp_serde::to_vec_named(&BlockResponse {
            block: block.clone(),
        })
        .unwrap();

        let decoded = decode_block(&raw).unwrap();
        assert_eq!(decoded.round, 9);
        assert_eq!(decoded.previous_block_hash, block.previous_block_hash);
        assert_eq!(decoded.payset.len(), 1);
        assert_eq!(decoded.payset[0].txn.application_id, 123);
        assert_eq!(decoded.payset[0].txn.application_args[0].as_ref(), b"hello");
    }

    #[test]
    fn transaction_id_is_deterministic_and_content_sensitive() {
        let a = transaction_id(&app_call_txn()).unwrap();
        let b = transaction_id(&app_call_txn()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 52); // 32-byte digest in unpadded base32

        let mut other = app_call_txn();
        other.application_id = 124;
        assert_ne!(a, transaction_id(&other).unwrap());
    }

    #[test]
    fn address_encoding_shape() {
        let addr = encode_address(&[7u8; 32]);
        assert_eq!(addr.len(), 58); // 36 bytes in unpadded base32
        assert!(addr.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));

        // Stable for equal keys, distinct for different keys.
        assert_eq!(addr, encode_address(&[7u8; 32]));
        assert_ne!(addr, encode_address(&[8u8; 32]));
    }

    #[test]
    fn digest_rendering_matches_base32() {
        assert_eq!(digest_to_string(&[0u8; 4]), "AAAAAAA");
    }
}
