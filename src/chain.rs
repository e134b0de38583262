// std
use std::collections::BTreeMap;
// crates.io
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
// self
use crate::types::*;

/// Size in vbytes of an OP_RETURN output before its payload: value (8),
/// script length (1), OP_RETURN (1), push opcode (1).
pub const OP_RETURN_BASE: Satoshi = 11;

/// Supported UTXO chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
	Bitcoin,
	BitcoinCash,
	Dogecoin,
	Litecoin,
	Zcash,
}
impl Chain {
	pub fn params(self) -> &'static ChainParams {
		&REGISTRY[&self]
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum InputKind {
	P2pkh,
	P2sh,
	P2tr,
	P2wpkh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputKind {
	P2pkh,
	P2sh,
	P2tr,
	P2wpkh,
	P2wsh,
	/// OP_RETURN output carrying `payload_len` bytes of data.
	Data { payload_len: usize },
}

/// Static per-chain constants, loaded once into [`REGISTRY`].
#[derive(Debug)]
pub struct ChainParams {
	pub name: &'static str,
	pub ticker: &'static str,
	pub dust_limit: Satoshi,
	pub supports_segwit: bool,
	/// Default sighash flag in consensus encoding, e.g. `0x41` for the
	/// Bitcoin Cash `ALL|FORKID`.
	pub sighash_flag: u32,
	pub tx_overhead: Satoshi,
	input_sizes: BTreeMap<InputKind, Satoshi>,
	output_sizes: BTreeMap<OutputKind, Satoshi>,
}
impl ChainParams {
	pub fn default_input_kind(&self) -> InputKind {
		if self.supports_segwit {
			InputKind::P2wpkh
		} else {
			InputKind::P2pkh
		}
	}

	pub fn default_output_kind(&self) -> OutputKind {
		if self.supports_segwit {
			OutputKind::P2wpkh
		} else {
			OutputKind::P2pkh
		}
	}

	/// Virtual size of one input of `kind`; unknown kinds fall back to the
	/// chain's default spend type.
	pub fn input_size(&self, kind: InputKind) -> Satoshi {
		self.input_sizes
			.get(&kind)
			.copied()
			.unwrap_or_else(|| self.input_sizes[&self.default_input_kind()])
	}

	/// Virtual size of one output of `kind`; data outputs are priced as
	/// [`OP_RETURN_BASE`] plus their payload length.
	pub fn output_size(&self, kind: OutputKind) -> Satoshi {
		if let OutputKind::Data { payload_len } = kind {
			return OP_RETURN_BASE + payload_len as Satoshi;
		}

		self.output_sizes
			.get(&kind)
			.copied()
			.unwrap_or_else(|| self.output_sizes[&self.default_output_kind()])
	}
}

static REGISTRY: Lazy<BTreeMap<Chain, ChainParams>> = Lazy::new(|| {
	BTreeMap::from([
		(Chain::Bitcoin, ChainParams {
			name: "Bitcoin",
			ticker: "BTC",
			dust_limit: 546,
			supports_segwit: true,
			sighash_flag: 0x01,
			tx_overhead: 11,
			input_sizes: BTreeMap::from([
				(InputKind::P2pkh, 148),
				(InputKind::P2sh, 91),
				(InputKind::P2tr, 58),
				(InputKind::P2wpkh, 68),
			]),
			output_sizes: BTreeMap::from([
				(OutputKind::P2pkh, 34),
				(OutputKind::P2sh, 32),
				(OutputKind::P2tr, 43),
				(OutputKind::P2wpkh, 31),
				(OutputKind::P2wsh, 43),
			]),
		}),
		(Chain::BitcoinCash, ChainParams {
			name: "Bitcoin Cash",
			ticker: "BCH",
			dust_limit: 546,
			supports_segwit: false,
			sighash_flag: 0x41,
			tx_overhead: 10,
			input_sizes: BTreeMap::from([(InputKind::P2pkh, 148), (InputKind::P2sh, 91)]),
			output_sizes: BTreeMap::from([(OutputKind::P2pkh, 34), (OutputKind::P2sh, 32)]),
		}),
		(Chain::Dogecoin, ChainParams {
			name: "Dogecoin",
			ticker: "DOGE",
			dust_limit: 1_000_000,
			supports_segwit: false,
			sighash_flag: 0x01,
			tx_overhead: 10,
			input_sizes: BTreeMap::from([(InputKind::P2pkh, 148), (InputKind::P2sh, 91)]),
			output_sizes: BTreeMap::from([(OutputKind::P2pkh, 34), (OutputKind::P2sh, 32)]),
		}),
		(Chain::Litecoin, ChainParams {
			name: "Litecoin",
			ticker: "LTC",
			dust_limit: 546,
			supports_segwit: true,
			sighash_flag: 0x01,
			tx_overhead: 11,
			input_sizes: BTreeMap::from([
				(InputKind::P2pkh, 148),
				(InputKind::P2sh, 91),
				(InputKind::P2wpkh, 68),
			]),
			output_sizes: BTreeMap::from([
				(OutputKind::P2pkh, 34),
				(OutputKind::P2sh, 32),
				(OutputKind::P2wpkh, 31),
				(OutputKind::P2wsh, 43),
			]),
		}),
		(Chain::Zcash, ChainParams {
			name: "Zcash",
			ticker: "ZEC",
			dust_limit: 546,
			supports_segwit: false,
			sighash_flag: 0x01,
			tx_overhead: 10,
			input_sizes: BTreeMap::from([(InputKind::P2pkh, 148), (InputKind::P2sh, 91)]),
			output_sizes: BTreeMap::from([(OutputKind::P2pkh, 34), (OutputKind::P2sh, 32)]),
		}),
	])
});

#[test]
fn registry_lookup_should_work() {
	let btc = Chain::Bitcoin.params();

	assert_eq!(btc.ticker, "BTC");
	assert_eq!(btc.input_size(InputKind::P2wpkh), 68);
	assert_eq!(btc.output_size(OutputKind::P2wpkh), 31);
	assert_eq!(btc.output_size(OutputKind::Data { payload_len: 20 }), OP_RETURN_BASE + 20);
}

#[test]
fn unknown_kind_falls_back_to_default_should_work() {
	// Taproot is absent from the Litecoin table; SegWit chains fall back to
	// P2WPKH sizing.
	assert_eq!(Chain::Litecoin.params().input_size(InputKind::P2tr), 68);
	// Non-SegWit chains fall back to P2PKH sizing.
	assert_eq!(Chain::Dogecoin.params().input_size(InputKind::P2wpkh), 148);
	assert_eq!(Chain::Dogecoin.params().output_size(OutputKind::P2wpkh), 34);
}
