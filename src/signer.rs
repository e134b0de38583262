//! Reconciles externally produced threshold signatures with the exact
//! per-input signature hash the signer must have produced, then finalizes
//! the transaction.
//!
//! The lookup key for a signature is the lowercase hex encoding of the
//! 32-byte per-input sighash digest; the external signing subsystem is
//! expected to key its results by the digest it was asked to sign.

// std
use std::collections::HashMap;
// crates.io
use bitcoin::{
	consensus,
	hashes::Hash,
	psbt::Psbt,
	script::PushBytesBuf,
	secp256k1::{ecdsa, schnorr, All, Message, Secp256k1},
	sighash::{Prevouts, SighashCache},
	EcdsaSighashType, Script, TapSighashType, TxOut, Witness,
};
use once_cell::sync::Lazy;
// self
#[cfg(test)] use crate::test_util;
use crate::prelude::*;

static SECP256K1: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// One signature from the threshold subsystem: 64-byte compact `R || S` or
/// DER, plus the recovery indicator the signing rounds emit. The indicator is
/// carried for completeness; Bitcoin-family scripts name the key explicitly,
/// so no public-key recovery happens here.
#[derive(Clone, Debug)]
pub struct TssSignature {
	pub signature: Vec<u8>,
	pub recovery_id: u8,
}

/// Externally produced signatures keyed by [`sighash_key`].
pub type SignatureMap = HashMap<String, TssSignature>;

/// What the external signer must sign for one input.
#[derive(Debug)]
pub struct SigningDigest {
	pub input: usize,
	pub key: String,
	pub digest: [u8; 32],
	/// Schnorr (taproot key spend) rather than ECDSA.
	pub taproot: bool,
}

/// The fixed transform from a per-input sighash to its map key.
pub fn sighash_key(digest: &[u8]) -> String {
	array_bytes::bytes2hex("", digest)
}

/// Computes the per-input signing digests of a serialized PSBT, in input
/// order. These are what the threshold subsystem is asked to sign.
pub fn signing_digests(psbt_bytes: &[u8]) -> Result<Vec<SigningDigest>> {
	let psbt = Psbt::deserialize(psbt_bytes).map_err(SignError::Parse)?;

	if psbt.unsigned_tx.input.is_empty() {
		Err(SignError::MissingUnsignedTx)?;
	}

	let spent = spent_outputs(&psbt)?;
	let tx = psbt.unsigned_tx.clone();
	let mut cache = SighashCache::new(&tx);

	(0..psbt.inputs.len())
		.map(|i| {
			let (digest, taproot) = input_digest(&mut cache, &psbt, &spent, i)?;

			Ok(SigningDigest { input: i, key: sighash_key(&digest), digest, taproot })
		})
		.collect()
}

/// Matches `signatures` to every input of the PSBT, finalizes and extracts
/// the network-ready transaction bytes.
///
/// All work happens on an owned copy; no partially-signed state is ever
/// observable by the caller. The call aborts on the first input with no
/// matching signature.
pub fn sign(psbt_bytes: &[u8], signatures: &SignatureMap) -> Result<Vec<u8>> {
	let mut work = Psbt::deserialize(psbt_bytes).map_err(SignError::Parse)?;

	if work.unsigned_tx.input.is_empty() {
		Err(SignError::MissingUnsignedTx)?;
	}

	let spent = spent_outputs(&work)?;
	let tx = work.unsigned_tx.clone();
	let mut cache = SighashCache::new(&tx);

	for i in 0..work.inputs.len() {
		let (digest, taproot) = input_digest(&mut cache, &work, &spent, i)?;
		let key = sighash_key(&digest);
		let tss = signatures
			.get(&key)
			.ok_or(SignError::MissingSignature { input: i, key: key.clone() })?;
		let signer_pk = expected_pubkey(&work, i)?;
		let msg = Message::from_digest(digest);
		let flag = work.inputs[i]
			.sighash_type
			.map(|t| t.to_u32())
			// Sign everything when the artifact carries no explicit flag.
			.unwrap_or(EcdsaSighashType::All as u32);

		if taproot {
			let sig = schnorr::Signature::from_slice(&tss.signature)
				.map_err(|_| SignError::SignatureMismatch { input: i })?;

			SECP256K1
				.verify_schnorr(&sig, &msg, &signer_pk.x_only_public_key().0)
				.map_err(|_| SignError::SignatureMismatch { input: i })?;

			work.inputs[i].tap_key_sig = Some(bitcoin::taproot::Signature {
				signature: sig,
				sighash_type: TapSighashType::Default,
			});
		} else {
			let mut sig = if tss.signature.len() == 64 {
				ecdsa::Signature::from_compact(&tss.signature)
			} else {
				ecdsa::Signature::from_der(&tss.signature)
			}
			.map_err(|_| SignError::SignatureMismatch { input: i })?;

			// Threshold rounds may emit a high-S signature; the network only
			// relays the low-S form.
			sig.normalize_s();
			SECP256K1
				.verify_ecdsa(&msg, &sig, &signer_pk)
				.map_err(|_| SignError::SignatureMismatch { input: i })?;

			// The sighash-flag byte rides along with the DER signature.
			work.inputs[i].partial_sigs.insert(
				bitcoin::PublicKey::new(signer_pk),
				bitcoin::ecdsa::Signature {
					signature: sig,
					sighash_type: EcdsaSighashType::from_consensus(flag),
				},
			);
		}
	}

	// Every input has its partial signature; turn them into final unlocking
	// scripts/witnesses.
	for i in 0..work.inputs.len() {
		finalize_input(&mut work, &spent[i].script_pubkey, i)?;
	}

	let tx = work.extract_tx().map_err(SignError::Serialize)?;

	tracing::debug!("signed tx: {tx:?}");

	Ok(consensus::serialize(&tx))
}

fn spent_outputs(psbt: &Psbt) -> Result<Vec<TxOut>> {
	psbt.unsigned_tx
		.input
		.iter()
		.zip(&psbt.inputs)
		.enumerate()
		.map(|(i, (txin, psbt_in))| {
			if let Some(o) = &psbt_in.witness_utxo {
				return Ok(o.clone());
			}
			if let Some(prev) = &psbt_in.non_witness_utxo {
				return prev
					.output
					.get(txin.previous_output.vout as usize)
					.cloned()
					.ok_or_else(|| {
						SignError::SighashCompute {
							input: i,
							reason: "previous transaction has no such output".into(),
						}
						.into()
					});
			}

			Err(SignError::SighashCompute { input: i, reason: "missing spent output".into() }
				.into())
		})
		.collect()
}

fn input_digest(
	cache: &mut SighashCache<&bitcoin::Transaction>,
	psbt: &Psbt,
	spent: &[TxOut],
	i: usize,
) -> Result<([u8; 32], bool)> {
	let spk = &spent[i].script_pubkey;
	let flag = psbt.inputs[i]
		.sighash_type
		.map(|t| t.to_u32())
		.unwrap_or(EcdsaSighashType::All as u32);

	// `EcdsaSighashType::from_consensus` masks unknown bits, which would
	// silently turn a fork-id flag such as the Bitcoin Cash `ALL|FORKID`
	// (0x41) into plain `ALL`. Signature assembly covers the Bitcoin rules
	// only; artifacts carrying a fork-id flag are rejected outright.
	if flag & 0x40 != 0 {
		Err(SignError::UnsupportedSighashFlag { input: i, flag })?;
	}

	if spk.is_p2tr() {
		// Key spend with the default (implicit ALL) taproot sighash.
		let digest = cache
			.taproot_key_spend_signature_hash(i, &Prevouts::All(spent), TapSighashType::Default)
			.map_err(|e| SignError::SighashCompute { input: i, reason: e.to_string() })?;

		Ok((digest.to_byte_array(), true))
	} else if spk.is_p2wpkh() {
		// BIP143.
		let digest = cache
			.p2wpkh_signature_hash(i, spk, spent[i].value, EcdsaSighashType::from_consensus(flag))
			.map_err(|e| SignError::SighashCompute { input: i, reason: e.to_string() })?;

		Ok((digest.to_byte_array(), false))
	} else {
		let digest = cache
			.legacy_signature_hash(i, spk, flag)
			.map_err(|e| SignError::SighashCompute { input: i, reason: e.to_string() })?;

		Ok((digest.to_byte_array(), false))
	}
}

fn expected_pubkey(psbt: &Psbt, i: usize) -> Result<bitcoin::secp256k1::PublicKey> {
	let derivation = &psbt.inputs[i].bip32_derivation;

	if derivation.len() != 1 {
		Err(SignError::MissingPublicKey { input: i })?;
	}

	// secp256k1 keys serialize to exactly 33 compressed bytes.
	Ok(*derivation.keys().next().ok_or(SignError::MissingPublicKey { input: i })?)
}

fn finalize_input(work: &mut Psbt, spk: &Script, i: usize) -> Result<()> {
	let input = &mut work.inputs[i];

	if spk.is_p2tr() {
		let sig = input.tap_key_sig.ok_or(SignError::Finalize {
			input: i,
			reason: "no taproot key-spend signature".into(),
		})?;

		input.final_script_witness = Some(Witness::p2tr_key_spend(&sig));
	} else if spk.is_p2wpkh() {
		let (pk, sig) =
			input.partial_sigs.iter().map(|(pk, sig)| (*pk, *sig)).next().ok_or(
				SignError::Finalize { input: i, reason: "no partial signature".into() },
			)?;

		input.final_script_witness = Some(Witness::p2wpkh(&sig, &pk.inner));
	} else if spk.is_p2pkh() {
		let (pk, sig) =
			input.partial_sigs.iter().map(|(pk, sig)| (*pk, *sig)).next().ok_or(
				SignError::Finalize { input: i, reason: "no partial signature".into() },
			)?;
		let sig_push =
			PushBytesBuf::try_from(sig.to_vec()).map_err(BitcoinError::PushBytes)?;

		input.final_script_sig = Some(
			Script::builder().push_slice(sig_push).push_slice(pk.inner.serialize()).into_script(),
		);
	} else {
		Err(SignError::Finalize {
			input: i,
			reason: format!("unsupported spend type: {spk:?}"),
		})?;
	}

	// A finalized input carries only its final script/witness.
	input.partial_sigs.clear();
	input.tap_key_sig = None;
	input.sighash_type = None;
	input.bip32_derivation.clear();
	input.tap_internal_key = None;

	Ok(())
}

#[cfg(test)]
pub(crate) fn build_test_psbt(utxo_values: &[crate::types::Satoshi]) -> (Vec<u8>, bitcoin::key::Keypair) {
	// self
	use crate::types::Utxo;

	let keypair = test_util::keypair(7);
	// Distinct outpoints, distinct digests.
	let utxos = utxo_values
		.iter()
		.enumerate()
		.map(|(i, &v)| Utxo { vout: i as _, ..Utxo::with_value(v) })
		.collect::<Vec<_>>();

	(build_test_psbt_from(&utxos, None, &keypair), keypair)
}

#[cfg(test)]
fn build_test_psbt_from(
	utxos: &[crate::types::Utxo],
	previous_txs: Option<HashMap<bitcoin::Txid, Vec<u8>>>,
	keypair: &bitcoin::key::Keypair,
) -> Vec<u8> {
	// crates.io
	use bitcoin::Network;
	// self
	use crate::{builder, chain::Chain, output, select::Strategy};

	let pk = keypair.public_key().serialize();
	let recipient =
		output::change_address(Chain::Bitcoin.params(), &pk, Network::Bitcoin).unwrap().to_string();

	builder::TxBuilder {
		chain: Chain::Bitcoin,
		network: Network::Bitcoin,
		fee_rate: 10,
		from_pubkey: &pk,
		utxos,
		outputs: builder::send_outputs(&recipient, 50_000),
		change_address: None,
		previous_txs,
		strategy: Strategy::SmallestFirst,
	}
	.build()
	.unwrap()
	.psbt
}

#[test]
fn sign_with_empty_map_should_fail() {
	let (psbt, _) = build_test_psbt(&[100_000]);

	assert!(matches!(
		sign(&psbt, &SignatureMap::new()).unwrap_err(),
		Error::Sign(SignError::MissingSignature { input: 0, .. })
	));
}

#[test]
fn sign_should_work() {
	let (psbt, keypair) = build_test_psbt(&[40_000, 30_000]);
	let digests = signing_digests(&psbt).unwrap();

	assert_eq!(digests.len(), 2);

	let mut signatures = SignatureMap::new();

	for d in &digests {
		assert!(!d.taproot);

		let sig = SECP256K1.sign_ecdsa(&Message::from_digest(d.digest), &keypair.secret_key());

		signatures.insert(d.key.clone(), TssSignature {
			signature: sig.serialize_compact().to_vec(),
			recovery_id: 0,
		});
	}

	let tx_bytes = sign(&psbt, &signatures).unwrap();
	let tx = consensus::deserialize::<bitcoin::Transaction>(&tx_bytes).unwrap();

	// Both inputs finalized with the two-element P2WPKH witness.
	assert_eq!(tx.input.len(), 2);

	for input in &tx.input {
		assert_eq!(input.witness.len(), 2);
		assert!(input.script_sig.is_empty());
	}
}

#[test]
fn sign_legacy_p2pkh_should_work() {
	// crates.io
	use bitcoin::{
		absolute::LockTime,
		transaction::Version,
		Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
	};
	// self
	use crate::types::Utxo;

	let keypair = test_util::keypair(7);
	let pk = bitcoin::PublicKey::new(keypair.public_key());
	let spk = ScriptBuf::new_p2pkh(&pk.pubkey_hash());
	let funding = Transaction {
		version: Version::TWO,
		lock_time: LockTime::ZERO,
		input: vec![TxIn {
			previous_output: OutPoint::null(),
			script_sig: ScriptBuf::new(),
			sequence: Sequence::MAX,
			witness: Witness::default(),
		}],
		output: vec![TxOut { value: Amount::from_sat(100_000), script_pubkey: spk.clone() }],
	};
	let txid = funding.compute_txid();
	let utxos = [Utxo { txid, value: 100_000, vout: 0, script_pubkey: Some(spk) }];
	let previous_txs = HashMap::from([(txid, consensus::serialize(&funding))]);
	let psbt = build_test_psbt_from(&utxos, Some(previous_txs), &keypair);
	// Leave only the full funding transaction as the sighash prerequisite.
	let mut stripped = Psbt::deserialize(&psbt).unwrap();

	stripped.inputs[0].witness_utxo = None;

	let psbt = stripped.serialize();
	let digests = signing_digests(&psbt).unwrap();

	assert!(!digests[0].taproot);

	let sig =
		SECP256K1.sign_ecdsa(&Message::from_digest(digests[0].digest), &keypair.secret_key());
	let signatures = SignatureMap::from([(digests[0].key.clone(), TssSignature {
		signature: sig.serialize_compact().to_vec(),
		recovery_id: 0,
	})]);
	let tx_bytes = sign(&psbt, &signatures).unwrap();
	let tx = consensus::deserialize::<bitcoin::Transaction>(&tx_bytes).unwrap();

	// Legacy unlock lives in the script_sig; no witness.
	assert!(tx.input[0].witness.is_empty());
	assert!(!tx.input[0].script_sig.is_empty());
}

#[test]
fn sign_taproot_key_spend_should_work() {
	// crates.io
	use bitcoin::{key::TweakedPublicKey, ScriptBuf};
	// self
	use crate::types::Utxo;

	let keypair = test_util::keypair(7);
	let xonly = keypair.x_only_public_key().0;
	let spk = ScriptBuf::new_p2tr_tweaked(TweakedPublicKey::dangerous_assume_tweaked(xonly));
	let utxos = [Utxo { script_pubkey: Some(spk), ..Utxo::with_value(100_000) }];
	let psbt = build_test_psbt_from(&utxos, None, &keypair);
	let digests = signing_digests(&psbt).unwrap();

	assert!(digests[0].taproot);

	let sig = SECP256K1.sign_schnorr(&Message::from_digest(digests[0].digest), &keypair);
	let signatures = SignatureMap::from([(digests[0].key.clone(), TssSignature {
		signature: sig.serialize().to_vec(),
		recovery_id: 0,
	})]);
	let tx_bytes = sign(&psbt, &signatures).unwrap();
	let tx = consensus::deserialize::<bitcoin::Transaction>(&tx_bytes).unwrap();

	// Key-spend witness is the single 64-byte signature.
	assert_eq!(tx.input[0].witness.len(), 1);
	assert_eq!(tx.input[0].witness[0].len(), 64);
	assert!(tx.input[0].script_sig.is_empty());
}

#[test]
fn sign_rejects_forkid_flag_should_fail() {
	let (psbt, _) = build_test_psbt(&[100_000]);
	let mut work = Psbt::deserialize(&psbt).unwrap();

	work.inputs[0].sighash_type = Some(bitcoin::psbt::PsbtSighashType::from_u32(0x41));

	assert!(matches!(
		signing_digests(&work.serialize()).unwrap_err(),
		Error::Sign(SignError::UnsupportedSighashFlag { input: 0, flag: 0x41 })
	));
}

#[test]
fn sign_accepts_der_should_work() {
	let (psbt, keypair) = build_test_psbt(&[100_000]);
	let digests = signing_digests(&psbt).unwrap();
	let sig =
		SECP256K1.sign_ecdsa(&Message::from_digest(digests[0].digest), &keypair.secret_key());
	let signatures = SignatureMap::from([(digests[0].key.clone(), TssSignature {
		signature: sig.serialize_der().to_vec(),
		recovery_id: 0,
	})]);

	assert!(sign(&psbt, &signatures).is_ok());
}

#[test]
fn sign_rejects_foreign_signature_should_fail() {
	let (psbt, _) = build_test_psbt(&[100_000]);
	let digests = signing_digests(&psbt).unwrap();
	// Signed by a key that is not the vault key.
	let intruder = test_util::keypair(9);
	let sig =
		SECP256K1.sign_ecdsa(&Message::from_digest(digests[0].digest), &intruder.secret_key());
	let signatures = SignatureMap::from([(digests[0].key.clone(), TssSignature {
		signature: sig.serialize_compact().to_vec(),
		recovery_id: 0,
	})]);

	assert!(matches!(
		sign(&psbt, &signatures).unwrap_err(),
		Error::Sign(SignError::SignatureMismatch { input: 0 })
	));
}
