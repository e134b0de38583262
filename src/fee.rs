//! Virtual-size and fee estimation over the per-chain size tables.

// self
use crate::{chain::*, types::*};

/// Estimated virtual size for explicit per-item spend/output types.
pub fn estimate_vbytes(params: &ChainParams, inputs: &[InputKind], outputs: &[OutputKind]) -> Satoshi {
	params.tx_overhead
		+ inputs.iter().map(|&k| params.input_size(k)).sum::<Satoshi>()
		+ outputs.iter().map(|&k| params.output_size(k)).sum::<Satoshi>()
}

/// Estimated virtual size from bare counts, pricing every item as the chain's
/// default spend/output type. This is what the selector iterates on before
/// concrete output types are known.
pub fn estimate_vbytes_for_counts(
	params: &ChainParams,
	input_count: usize,
	output_count: usize,
) -> Satoshi {
	params.tx_overhead
		+ input_count as Satoshi * params.input_size(params.default_input_kind())
		+ output_count as Satoshi * params.output_size(params.default_output_kind())
}

/// Integer fee, no rounding. Zero counts are not rejected here; the
/// transaction builder validates its own parameters.
pub fn calculate_fee(vbytes: Satoshi, fee_rate: Satoshi) -> Satoshi {
	vbytes * fee_rate
}

#[test]
fn estimate_vbytes_should_work() {
	let params = Chain::Bitcoin.params();

	// 11 + 1 * 68 + 2 * 31.
	assert_eq!(estimate_vbytes_for_counts(params, 1, 2), 141);
	assert_eq!(
		estimate_vbytes(params, &[InputKind::P2wpkh], &[
			OutputKind::P2wpkh,
			OutputKind::P2wpkh
		]),
		141
	);
	// A data output adds its base plus the payload length.
	assert_eq!(
		estimate_vbytes(params, &[InputKind::P2wpkh], &[
			OutputKind::P2wpkh,
			OutputKind::Data { payload_len: 40 }
		]),
		11 + 68 + 31 + OP_RETURN_BASE + 40
	);
}

#[test]
fn estimate_vbytes_legacy_chain_should_work() {
	let params = Chain::Dogecoin.params();

	// 10 + 1 * 148 + 2 * 34.
	assert_eq!(estimate_vbytes_for_counts(params, 1, 2), 226);
}

#[test]
fn calculate_fee_should_work() {
	assert_eq!(calculate_fee(141, 10), 1410);
	assert_eq!(calculate_fee(0, 10), 0);
	assert_eq!(calculate_fee(141, 0), 0);
}
