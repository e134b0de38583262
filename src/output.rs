//! Locking-script construction for requested outputs and change.

// crates.io
use bitcoin::{
	address::NetworkUnchecked,
	opcodes::all::OP_RETURN,
	script::PushBytesBuf,
	Address, Amount, CompressedPublicKey, Network, Script, TxOut,
};
// self
#[cfg(test)] use crate::test_util;
use crate::{chain::*, prelude::*, types::*};

/// Maximum data-output payload. A conservative bound chosen for
/// memo-carrying cross-chain swap compatibility, not the network's raw relay
/// limit.
pub const MAX_DATA_LEN: usize = 80;

/// Destination for one requested output. Address and data destinations are
/// mutually exclusive by construction.
#[cfg_attr(test, derive(PartialEq))]
#[derive(Clone, Debug)]
pub enum OutputRequest {
	Address { address: String, amount: Satoshi },
	Data { payload: Vec<u8> },
}
impl OutputRequest {
	pub fn amount(&self) -> Satoshi {
		match self {
			Self::Address { amount, .. } => *amount,
			// Data outputs are always zero-valued.
			Self::Data { .. } => 0,
		}
	}

	/// The size-table kind this output is priced as: data outputs by payload
	/// length, address outputs as the chain's default output type.
	pub fn kind(&self, params: &ChainParams) -> OutputKind {
		match self {
			Self::Address { .. } => params.default_output_kind(),
			Self::Data { payload } => OutputKind::Data { payload_len: payload.len() },
		}
	}
}

pub fn addr_from_str(s: &str, network: Network) -> Result<Address> {
	Ok(s.parse::<Address<NetworkUnchecked>>()
		.map_err(BitcoinError::Parse)?
		.require_network(network)
		.map_err(BitcoinError::Parse)?)
}

/// Canonical locking script + value for an address destination.
pub fn address_output(
	params: &ChainParams,
	address: &str,
	amount: Satoshi,
	network: Network,
) -> Result<TxOut> {
	let script_pubkey = addr_from_str(address, network)?.script_pubkey();

	if !params.supports_segwit && script_pubkey.is_witness_program() {
		Err(BuildError::UnsupportedOutputType {
			chain: params.name,
			kind: "witness program".into(),
		})?;
	}

	Ok(TxOut { script_pubkey, value: Amount::from_sat(amount) })
}

/// Zero-valued OP_RETURN output carrying `payload`.
pub fn op_return_output(payload: &[u8]) -> Result<TxOut> {
	if payload.len() > MAX_DATA_LEN {
		Err(BuildError::PayloadTooLarge { max: MAX_DATA_LEN, actual: payload.len() })?;
	}

	let mut buf = PushBytesBuf::new();

	buf.extend_from_slice(payload).map_err(BitcoinError::PushBytes)?;

	Ok(TxOut {
		script_pubkey: Script::builder().push_opcode(OP_RETURN).push_slice(buf).into_script(),
		value: Amount::ZERO,
	})
}

/// Default change address: single-signature spend of the vault's 33-byte
/// compressed public key, native-witness where the chain supports it and
/// P2PKH otherwise.
pub fn change_address(params: &ChainParams, pubkey: &[u8], network: Network) -> Result<Address> {
	if pubkey.len() != 33 {
		Err(BuildError::InvalidPublicKey(pubkey.len()))?;
	}

	let pk = bitcoin::secp256k1::PublicKey::from_slice(pubkey)?;

	if params.supports_segwit {
		Ok(Address::p2wpkh(&CompressedPublicKey(pk), network))
	} else {
		Ok(Address::p2pkh(&bitcoin::PublicKey::new(pk), network))
	}
}

#[test]
fn op_return_output_should_work() {
	let out = op_return_output(&[0x58; 80]).unwrap();

	assert_eq!(out.value, Amount::ZERO);
	assert!(out.script_pubkey.is_op_return());

	assert!(matches!(
		op_return_output(&[0x58; 81]).unwrap_err(),
		Error::Build(BuildError::PayloadTooLarge { max: 80, actual: 81 })
	));
}

#[test]
fn change_address_should_work() {
	let pk = test_util::keypair(1).public_key().serialize();
	let addr = change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap();

	assert!(addr.script_pubkey().is_p2wpkh());

	// Non-SegWit chains fall back to the base P2PKH spend.
	let addr = change_address(Chain::Dogecoin.params(), &pk, Network::Bitcoin).unwrap();

	assert!(addr.script_pubkey().is_p2pkh());

	assert!(matches!(
		change_address(Chain::Bitcoin.params(), &pk[..32], Network::Bitcoin).unwrap_err(),
		Error::Build(BuildError::InvalidPublicKey(32))
	));
}

#[test]
fn address_output_should_work() {
	let pk = test_util::keypair(1).public_key().serialize();
	let addr = change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap().to_string();
	let out = address_output(Chain::Bitcoin.params(), &addr, 1_000, Network::Bitcoin).unwrap();

	assert_eq!(out.value, Amount::from_sat(1_000));
	assert!(out.script_pubkey.is_p2wpkh());

	// A witness destination is not expressible on a non-SegWit chain.
	assert!(matches!(
		address_output(Chain::Dogecoin.params(), &addr, 1_000, Network::Bitcoin).unwrap_err(),
		Error::Build(BuildError::UnsupportedOutputType { .. })
	));
}
