// std
use std::str::FromStr;
// crates.io
#[cfg(test)] use bitcoin::hashes::Hash;
use bitcoin::{OutPoint, ScriptBuf, Txid};
// self
use crate::prelude::*;

pub type Satoshi = u64;
#[test]
fn max_btc_in_u64_should_work() {
	let max_u64 = Satoshi::MAX;
	let max_btc = 21_000_000_u64 * 100_000_000;

	assert!(max_u64 > max_btc);
}

pub type Index = u32;

/// An immutable snapshot of one spendable output.
///
/// The locking script is optional; when absent, downstream components derive
/// it from the vault public key (single-signature native-witness spend).
#[cfg_attr(test, derive(PartialEq))]
#[derive(Clone, Debug)]
pub struct Utxo {
	pub txid: Txid,
	pub value: Satoshi,
	pub vout: Index,
	pub script_pubkey: Option<ScriptBuf>,
}
impl Utxo {
	pub fn outpoint(&self) -> OutPoint {
		OutPoint { txid: self.txid, vout: self.vout }
	}
}
#[cfg(test)]
impl Default for Utxo {
	fn default() -> Self {
		Self {
			txid: Txid::from_raw_hash(Hash::all_zeros()),
			value: 0,
			vout: 0,
			script_pubkey: None,
		}
	}
}
#[cfg(test)]
impl Utxo {
	pub fn with_value(value: Satoshi) -> Self {
		Self { value, ..Default::default() }
	}
}
impl TryFrom<crate::api::mempool::Utxo> for Utxo {
	type Error = Error;

	fn try_from(value: crate::api::mempool::Utxo) -> Result<Self> {
		Ok(Self {
			txid: Txid::from_str(&value.txid).map_err(BitcoinError::HexToArray)?,
			value: value.value,
			vout: value.vout,
			script_pubkey: None,
		})
	}
}
