//! Unsigned-transaction assembly: validation, selection, change handling and
//! the PSBT artifact handed to the external signing round-trip.

// std
use std::collections::HashMap;
// crates.io
use bitcoin::{
	bip32::{DerivationPath, Fingerprint},
	blockdata::{
		locktime::absolute::LockTime,
		transaction::{Transaction, Version},
	},
	consensus,
	psbt::{Psbt, PsbtSighashType},
	secp256k1::PublicKey,
	Amount, Network, ScriptBuf, Sequence, Txid, TxIn, TxOut, Witness,
};
// self
#[cfg(test)] use crate::test_util;
use crate::{chain::*, fee, output, output::OutputRequest, prelude::*, select, select::Strategy, types::*};

/// Two-output send: recipient plus the change slot the builder reserves.
pub fn send_outputs(recipient: &str, amount: Satoshi) -> Vec<OutputRequest> {
	vec![OutputRequest::Address { address: recipient.into(), amount }]
}

/// Fixed-order swap slots: primary destination, memo data output, change.
/// Slot order matters; downstream chain relayers parse outputs positionally.
pub fn swap_outputs(
	destination: &str,
	amount: Satoshi,
	memo: &[u8],
) -> Result<Vec<OutputRequest>> {
	if memo.is_empty() {
		Err(BuildError::EmptyMemo)?;
	}

	Ok(vec![
		OutputRequest::Address { address: destination.into(), amount },
		OutputRequest::Data { payload: memo.to_vec() },
	])
}

#[derive(Debug)]
pub struct TxBuilder<'a> {
	pub chain: Chain,
	pub network: Network,
	pub fee_rate: Satoshi,
	/// The vault's 33-byte compressed public key; attached to every PSBT
	/// input as BIP32-derivation metadata so the signer knows which key the
	/// threshold subsystem must have used.
	pub from_pubkey: &'a [u8],
	pub utxos: &'a [Utxo],
	pub outputs: Vec<OutputRequest>,
	/// Explicit change address; defaults to the vault's own P2WPKH address.
	pub change_address: Option<String>,
	/// Raw previous transactions by txid, for chains that verify spends
	/// against the full funding transaction rather than the witness UTXO.
	pub previous_txs: Option<HashMap<Txid, Vec<u8>>>,
	pub strategy: Strategy,
}
impl TxBuilder<'_> {
	const LOCK_TIME: LockTime = LockTime::ZERO;
	const VERSION: Version = Version::TWO;

	pub fn build(self) -> Result<BuildResult> {
		let Self {
			chain,
			network,
			fee_rate,
			from_pubkey,
			utxos,
			outputs,
			change_address,
			previous_txs,
			strategy,
		} = self;
		let params = chain.params();

		// Pre-flight checks; everything after this point can assume
		// well-formed parameters.
		if utxos.is_empty() {
			Err(BuildError::NoUtxos)?;
		}
		if fee_rate == 0 {
			Err(BuildError::ZeroFeeRate)?;
		}
		if from_pubkey.len() != 33 {
			Err(BuildError::InvalidPublicKey(from_pubkey.len()))?;
		}
		if outputs.is_empty() {
			Err(BuildError::NoOutputs)?;
		}
		for o in &outputs {
			if let OutputRequest::Data { payload } = o {
				if payload.len() > output::MAX_DATA_LEN {
					Err(BuildError::PayloadTooLarge {
						max: output::MAX_DATA_LEN,
						actual: payload.len(),
					})?;
				}
			}
		}

		let target = outputs.iter().map(OutputRequest::amount).sum::<Satoshi>();
		let change_script = match &change_address {
			Some(a) => output::addr_from_str(a, network)?.script_pubkey(),
			None => output::change_address(params, from_pubkey, network)?.script_pubkey(),
		};

		// Change is subject to the same relay rules as the requested outputs.
		if !params.supports_segwit && change_script.is_witness_program() {
			Err(BuildError::UnsupportedOutputType {
				chain: params.name,
				kind: "witness program".into(),
			})?;
		}
		// One slot is reserved for change.
		let selection = select::select_with_dust_handling(
			params,
			utxos,
			target,
			fee_rate,
			outputs.len() + 1,
			strategy,
		)?;
		let input = selection
			.selected
			.iter()
			.map(|u| TxIn {
				previous_output: u.outpoint(),
				script_sig: ScriptBuf::new(),
				// Full sequence, no relative-timelock signaling.
				sequence: Sequence::MAX,
				witness: Witness::default(),
			})
			.collect::<Vec<_>>();
		// Requested outputs keep their caller-specified order.
		let mut txout = outputs
			.iter()
			.map(|o| match o {
				OutputRequest::Address { address, amount } =>
					output::address_output(params, address, *amount, network),
				OutputRequest::Data { payload } => output::op_return_output(payload),
			})
			.collect::<Result<Vec<_>>>()?;

		// The selector priced by counts; now that concrete output types are
		// known, recompute the authoritative fee from the skeleton's actual
		// size, still reserving the change slot.
		let input_kinds = selection
			.selected
			.iter()
			.map(|u| {
				u.script_pubkey
					.as_deref()
					.map(spend_kind)
					.unwrap_or_else(|| params.default_input_kind())
			})
			.collect::<Vec<_>>();
		let output_kinds = outputs
			.iter()
			.map(|o| o.kind(params))
			.chain([params.default_output_kind()])
			.collect::<Vec<_>>();
		let vbytes = fee::estimate_vbytes(params, &input_kinds, &output_kinds);
		let mut fee = fee::calculate_fee(vbytes, fee_rate);

		tracing::info!("estimated tx virtual size: {vbytes}");
		tracing::info!("fee: {fee}");

		let change = selection.total_value as i128 - target as i128 - fee as i128;
		let (change, change_index) = if change > params.dust_limit as i128 {
			let index = txout.len();

			txout.push(TxOut {
				script_pubkey: change_script,
				value: Amount::from_sat(change as Satoshi),
			});

			(change as Satoshi, Some(index))
		} else if change > 0 {
			// Sub-dust change is folded into the fee rather than emitted as
			// an unrelayable output.
			fee += change as Satoshi;

			(0, None)
		} else if change == 0 {
			(0, None)
		} else {
			let required = target + fee;

			Err(ChainError::InsufficientFunds {
				required,
				available: selection.total_value,
				shortfall: (-change) as Satoshi,
			})?
		};
		let unsigned_tx = Transaction {
			version: Self::VERSION,
			lock_time: Self::LOCK_TIME,
			input,
			output: txout,
		};

		tracing::debug!("unsigned tx: {unsigned_tx:?}");

		let signer_pk = PublicKey::from_slice(from_pubkey)?;
		let vault_script = vault_script_of(params, &signer_pk, network);
		let mut psbt = Psbt::from_unsigned_tx(unsigned_tx).map_err(BitcoinError::Psbt)?;

		for (i, utxo) in selection.selected.iter().enumerate() {
			let psbt_in = &mut psbt.inputs[i];
			let spk = utxo.script_pubkey.clone().unwrap_or_else(|| vault_script.clone());

			if spk.is_p2tr() {
				psbt_in.tap_internal_key = Some(signer_pk.x_only_public_key().0);
			}

			// Sighash prerequisites: spent value + locking script, plus the
			// full funding transaction where the caller supplied it.
			psbt_in.witness_utxo =
				Some(TxOut { script_pubkey: spk, value: Amount::from_sat(utxo.value) });

			if let Some(prev) = previous_txs.as_ref().and_then(|m| m.get(&utxo.txid)) {
				psbt_in.non_witness_utxo =
					Some(consensus::deserialize(prev).map_err(BitcoinError::Consensus)?);
			}

			psbt_in.sighash_type = Some(PsbtSighashType::from_u32(params.sighash_flag));
			psbt_in
				.bip32_derivation
				.insert(signer_pk, (Fingerprint::default(), DerivationPath::default()));
		}

		Ok(BuildResult {
			unsigned_tx: consensus::serialize(&psbt.unsigned_tx),
			psbt: psbt.serialize(),
			selected: selection.selected,
			fee,
			change,
			change_index,
			vbytes,
		})
	}
}

/// Artifacts of one build: the PSBT for the signer and the bare unsigned
/// transaction bytes for upstream policy evaluation.
#[derive(Debug)]
pub struct BuildResult {
	pub psbt: Vec<u8>,
	pub unsigned_tx: Vec<u8>,
	pub selected: Vec<Utxo>,
	pub fee: Satoshi,
	pub change: Satoshi,
	pub change_index: Option<usize>,
	pub vbytes: Satoshi,
}
impl BuildResult {
	pub fn unsigned_txid(&self) -> Result<Txid> {
		let tx =
			consensus::deserialize::<Transaction>(&self.unsigned_tx).map_err(BitcoinError::Consensus)?;

		Ok(tx.compute_txid())
	}
}

fn spend_kind(script: &bitcoin::Script) -> InputKind {
	if script.is_p2wpkh() {
		InputKind::P2wpkh
	} else if script.is_p2tr() {
		InputKind::P2tr
	} else if script.is_p2sh() {
		InputKind::P2sh
	} else {
		InputKind::P2pkh
	}
}

fn vault_script_of(params: &ChainParams, pk: &PublicKey, network: Network) -> ScriptBuf {
	if params.supports_segwit {
		bitcoin::Address::p2wpkh(&bitcoin::CompressedPublicKey(*pk), network).script_pubkey()
	} else {
		bitcoin::Address::p2pkh(&bitcoin::PublicKey::new(*pk), network).script_pubkey()
	}
}

#[cfg(test)]
fn test_builder<'a>(
	from_pubkey: &'a [u8],
	utxos: &'a [Utxo],
	outputs: Vec<OutputRequest>,
) -> TxBuilder<'a> {
	TxBuilder {
		chain: Chain::Bitcoin,
		network: Network::Bitcoin,
		fee_rate: 10,
		from_pubkey,
		utxos,
		outputs,
		change_address: None,
		previous_txs: None,
		strategy: Strategy::LargestFirst,
	}
}

#[test]
fn build_send_should_work() {
	test_util::init_tracing();

	let pk = test_util::keypair(1).public_key().serialize();
	let recipient = output::change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap().to_string();
	let utxos = [Utxo::with_value(100_000), Utxo::with_value(50_000)];
	let r = test_builder(&pk, &utxos, send_outputs(&recipient, 50_000)).build().unwrap();

	// One 100k input suffices; 141 vbytes at 10 sat/vb.
	assert_eq!(r.selected, [Utxo::with_value(100_000)]);
	assert_eq!(r.vbytes, 141);
	assert_eq!(r.fee, 1_410);
	assert_eq!(r.change, 100_000 - 50_000 - 1_410);
	assert_eq!(r.change_index, Some(1));

	let tx = consensus::deserialize::<Transaction>(&r.unsigned_tx).unwrap();

	assert_eq!(tx.input.len(), 1);
	assert_eq!(tx.output.len(), 2);
	assert_eq!(tx.output[0].value, Amount::from_sat(50_000));
	assert_eq!(tx.output[1].value, Amount::from_sat(48_590));
	assert_eq!(tx.input[0].sequence, Sequence::MAX);
}

#[test]
fn psbt_round_trip_should_work() {
	let pk = test_util::keypair(1).public_key().serialize();
	let recipient = output::change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap().to_string();
	let utxos = [Utxo::with_value(100_000)];
	let r = test_builder(&pk, &utxos, send_outputs(&recipient, 50_000)).build().unwrap();
	let psbt = Psbt::deserialize(&r.psbt).unwrap();

	// Re-parsing the artifact reproduces the identical unsigned transaction.
	assert_eq!(psbt.unsigned_tx.compute_txid(), r.unsigned_txid().unwrap());
	assert_eq!(psbt.inputs.len(), 1);
	assert!(psbt.inputs[0].witness_utxo.is_some());
	assert_eq!(psbt.inputs[0].bip32_derivation.len(), 1);
}

#[test]
fn build_swap_should_work() {
	let pk = test_util::keypair(1).public_key().serialize();
	let destination = output::change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap().to_string();
	let memo = b"SWAP:ETH.ETH:0x123";
	let r = test_builder(&pk, &[Utxo::with_value(1_000_000)], swap_outputs(&destination, 50_000, memo).unwrap())
		.build()
		.unwrap();
	let tx = consensus::deserialize::<Transaction>(&r.unsigned_tx).unwrap();

	// Destination, memo, change; in that order.
	assert_eq!(tx.output.len(), 3);
	assert!(tx.output[1].script_pubkey.is_op_return());
	assert_eq!(tx.output[1].value, Amount::ZERO);
	assert_eq!(r.change_index, Some(2));
}

#[test]
fn swap_empty_memo_should_fail() {
	// Fails before any UTXO is touched.
	assert!(matches!(
		swap_outputs("bc1qunused", 1, b"").unwrap_err(),
		Error::Build(BuildError::EmptyMemo)
	));
}

#[test]
fn build_validation_should_work() {
	let pk = test_util::keypair(1).public_key().serialize();
	let recipient = output::change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap().to_string();
	let utxos = [Utxo::with_value(100_000)];

	assert!(matches!(
		test_builder(&pk, &[], send_outputs(&recipient, 1)).build().unwrap_err(),
		Error::Build(BuildError::NoUtxos)
	));
	assert!(matches!(
		TxBuilder { fee_rate: 0, ..test_builder(&pk, &utxos, send_outputs(&recipient, 1)) }
			.build()
			.unwrap_err(),
		Error::Build(BuildError::ZeroFeeRate)
	));
	assert!(matches!(
		test_builder(&pk[..32], &utxos, send_outputs(&recipient, 1)).build().unwrap_err(),
		Error::Build(BuildError::InvalidPublicKey(32))
	));
	assert!(matches!(
		test_builder(&pk, &utxos, Vec::new()).build().unwrap_err(),
		Error::Build(BuildError::NoOutputs)
	));
	assert!(matches!(
		test_builder(&pk, &utxos, vec![OutputRequest::Data { payload: vec![0; 81] }])
			.build()
			.unwrap_err(),
		Error::Build(BuildError::PayloadTooLarge { .. })
	));
}

#[test]
fn build_nonsegwit_change_should_work() {
	let pk = test_util::keypair(1).public_key().serialize();
	let params = Chain::Dogecoin.params();
	let recipient = output::change_address(params, &pk, Network::Bitcoin).unwrap().to_string();
	let utxos = [Utxo::with_value(5_000_000)];
	let r = TxBuilder { chain: Chain::Dogecoin, ..test_builder(&pk, &utxos, send_outputs(&recipient, 50_000)) }
		.build()
		.unwrap();
	let tx = consensus::deserialize::<Transaction>(&r.unsigned_tx).unwrap();
	let change = &tx.output[r.change_index.unwrap()];

	// Derived change is a base-script spend the chain can relay.
	assert!(change.script_pubkey.is_p2pkh());
	assert!(!change.script_pubkey.is_witness_program());

	// An explicit witness-program change address is rejected outright.
	let segwit =
		output::change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap().to_string();

	assert!(matches!(
		TxBuilder {
			chain: Chain::Dogecoin,
			change_address: Some(segwit),
			..test_builder(&pk, &utxos, send_outputs(&recipient, 50_000))
		}
		.build()
		.unwrap_err(),
		Error::Build(BuildError::UnsupportedOutputType { .. })
	));
}

#[test]
fn build_folds_dust_change_should_work() {
	let pk = test_util::keypair(1).public_key().serialize();
	let recipient = output::change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap().to_string();
	// 51_950 - 50_000 - 1_410 = 540, below the 546 dust limit.
	let utxos = [Utxo::with_value(51_950)];
	let r = test_builder(&pk, &utxos, send_outputs(&recipient, 50_000)).build().unwrap();

	assert_eq!(r.change, 0);
	assert_eq!(r.change_index, None);
	assert_eq!(r.fee, 1_410 + 540);

	let tx = consensus::deserialize::<Transaction>(&r.unsigned_tx).unwrap();

	assert_eq!(tx.output.len(), 1);
}

#[test]
fn build_insufficient_funds_should_fail() {
	let pk = test_util::keypair(1).public_key().serialize();
	let recipient = output::change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap().to_string();

	assert!(matches!(
		test_builder(&pk, &[Utxo::with_value(10_000)], send_outputs(&recipient, 50_000))
			.build()
			.unwrap_err(),
		Error::Chain(ChainError::InsufficientFunds { .. })
	));
}
