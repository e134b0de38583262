//! UTXO selection under a fee constraint.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{chain::*, fee, prelude::*, types::*};

/// How candidate UTXOs are chosen for spending.
///
/// `LargestFirst` minimizes the input count and therefore the fee,
/// `SmallestFirst` consolidates fragmented dust at a higher fee, and
/// `SelectAll` sweeps the whole set regardless of the target (consolidation
/// and vault-migration flows).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
	LargestFirst,
	SmallestFirst,
	SelectAll,
}
impl Default for Strategy {
	fn default() -> Self {
		Self::LargestFirst
	}
}

/// Funding state of a selection. `Shortfall` can only be produced by
/// [`Strategy::SelectAll`], which bypasses the sufficiency check; the other
/// strategies fail with `InsufficientFunds` instead.
#[cfg_attr(test, derive(PartialEq))]
#[derive(Clone, Copy, Debug)]
pub enum Funding {
	Sufficient { change: Satoshi },
	Shortfall { amount: Satoshi },
}

#[cfg_attr(test, derive(PartialEq))]
#[derive(Debug)]
pub struct Selection {
	pub selected: Vec<Utxo>,
	pub total_value: Satoshi,
	pub target: Satoshi,
	pub fee: Satoshi,
	pub funding: Funding,
}
impl Selection {
	pub fn change(&self) -> Option<Satoshi> {
		match self.funding {
			Funding::Sufficient { change } => Some(change),
			Funding::Shortfall { .. } => None,
		}
	}
}

/// Greedily accumulates UTXOs in strategy order until the running total
/// covers `target` plus the fee re-estimated at the *current* input count.
///
/// `output_count` is the number of outputs the final transaction is expected
/// to carry (callers reserve a slot for change).
pub fn select(
	params: &ChainParams,
	utxos: &[Utxo],
	target: Satoshi,
	fee_rate: Satoshi,
	output_count: usize,
	strategy: Strategy,
) -> Result<Selection> {
	if matches!(strategy, Strategy::SelectAll) {
		return Ok(select_all(params, utxos, target, fee_rate, output_count));
	}

	let mut candidates = utxos.to_vec();

	candidates.sort_by(|a, b| match strategy {
		Strategy::LargestFirst => b.value.cmp(&a.value),
		Strategy::SmallestFirst => a.value.cmp(&b.value),
		Strategy::SelectAll => unreachable!(),
	});

	let mut selected = Vec::new();
	let mut total_value = 0;

	for utxo in candidates {
		total_value += utxo.value;
		selected.push(utxo);

		let fee = fee::calculate_fee(
			fee::estimate_vbytes_for_counts(params, selected.len(), output_count),
			fee_rate,
		);

		if total_value >= target + fee {
			tracing::debug!(
				"selected {} utxo(s), total {total_value}, fee {fee}",
				selected.len()
			);

			return Ok(Selection {
				total_value,
				target,
				fee,
				funding: Funding::Sufficient { change: total_value - target - fee },
				selected,
			});
		}
	}

	let fee = fee::calculate_fee(
		fee::estimate_vbytes_for_counts(params, selected.len(), output_count),
		fee_rate,
	);
	let required = target + fee;

	Err(ChainError::InsufficientFunds {
		required,
		available: total_value,
		shortfall: required - total_value,
	})?
}

/// Sweeps every supplied UTXO unconditionally. The sufficiency check is
/// replaced by the tagged [`Funding`] state.
fn select_all(
	params: &ChainParams,
	utxos: &[Utxo],
	target: Satoshi,
	fee_rate: Satoshi,
	output_count: usize,
) -> Selection {
	let selected = utxos.to_vec();
	let total_value = selected.iter().map(|u| u.value).sum::<Satoshi>();
	let fee = fee::calculate_fee(
		fee::estimate_vbytes_for_counts(params, selected.len(), output_count),
		fee_rate,
	);
	let spent = target + fee;
	let funding = if total_value >= spent {
		Funding::Sufficient { change: total_value - spent }
	} else {
		Funding::Shortfall { amount: spent - total_value }
	};

	Selection { selected, total_value, target, fee, funding }
}

/// [`select`], with sub-dust change folded into the fee so the selector never
/// proposes an unrelayable change output.
pub fn select_with_dust_handling(
	params: &ChainParams,
	utxos: &[Utxo],
	target: Satoshi,
	fee_rate: Satoshi,
	output_count: usize,
	strategy: Strategy,
) -> Result<Selection> {
	let mut selection = select(params, utxos, target, fee_rate, output_count, strategy)?;

	if let Funding::Sufficient { change } = selection.funding {
		if change > 0 && change < params.dust_limit {
			tracing::debug!("folding dust change {change} into fee");

			selection.fee += change;
			selection.funding = Funding::Sufficient { change: 0 };
		}
	}

	Ok(selection)
}

#[test]
fn largest_first_should_work() {
	let params = Chain::Bitcoin.params();
	let utxos =
		vec![Utxo::with_value(10_000), Utxo::with_value(50_000), Utxo::with_value(30_000)];
	let s = select(params, &utxos, 40_000, 10, 2, Strategy::LargestFirst).unwrap();

	// One input covers the target plus its own fee.
	assert_eq!(s.selected, [Utxo::with_value(50_000)]);
	assert_eq!(s.fee, 1_410);
	assert_eq!(s.funding, Funding::Sufficient { change: 50_000 - 40_000 - 1_410 });
}

#[test]
fn smallest_first_should_work() {
	let params = Chain::Bitcoin.params();
	let utxos =
		vec![Utxo::with_value(10_000), Utxo::with_value(50_000), Utxo::with_value(30_000)];
	let s = select(params, &utxos, 5_000, 10, 2, Strategy::SmallestFirst).unwrap();

	assert_eq!(s.selected, [Utxo::with_value(10_000)]);
}

#[test]
fn select_covers_target_plus_fee_or_fails_should_work() {
	let params = Chain::Bitcoin.params();

	for (values, target) in [
		(vec![1_000_u64, 2_000, 3_000], 4_000_u64),
		(vec![100_000], 1),
		(vec![600, 700, 800, 900], 2_000),
	] {
		let utxos = values.iter().copied().map(Utxo::with_value).collect::<Vec<_>>();

		match select(params, &utxos, target, 1, 2, Strategy::LargestFirst) {
			Ok(s) => assert!(s.total_value >= s.target + s.fee),
			Err(Error::Chain(ChainError::InsufficientFunds {
				required,
				available,
				shortfall,
			})) => {
				assert_eq!(available, values.iter().sum::<u64>());
				assert_eq!(shortfall, required - available);
			},
			Err(e) => panic!("unexpected error: {e:?}"),
		}
	}
}

#[test]
fn insufficient_funds_should_work() {
	let params = Chain::Bitcoin.params();
	let utxos = vec![Utxo::with_value(1_000)];
	let e = select(params, &utxos, 5_000, 10, 2, Strategy::LargestFirst).unwrap_err();

	// 11 + 68 + 62 = 141 vbytes at 10 sat/vb.
	assert!(matches!(
		e,
		Error::Chain(ChainError::InsufficientFunds {
			required: 6_410,
			available: 1_000,
			shortfall: 5_410,
		})
	));
}

#[test]
fn select_all_should_work() {
	let params = Chain::Bitcoin.params();
	let utxos =
		vec![Utxo::with_value(10_000), Utxo::with_value(50_000), Utxo::with_value(30_000)];

	// Every UTXO is returned no matter the target.
	let s = select(params, &utxos, 1, 10, 2, Strategy::SelectAll).unwrap();

	assert_eq!(s.selected.len(), 3);
	assert_eq!(s.total_value, 90_000);

	// An impossible target is reported as a shortfall, not an error.
	let s = select(params, &utxos, 1_000_000, 10, 2, Strategy::SelectAll).unwrap();

	assert_eq!(s.total_value, 90_000);
	assert!(matches!(s.funding, Funding::Shortfall { .. }));
	assert_eq!(s.change(), None);
}

#[test]
fn dust_handling_should_work() {
	let params = Chain::Bitcoin.params();
	let utxos = vec![Utxo::with_value(60_000)];

	// Change of 459 is below the 546 dust limit and folds into the fee.
	let s =
		select_with_dust_handling(params, &utxos, 59_400, 1, 2, Strategy::LargestFirst).unwrap();

	assert_eq!(s.funding, Funding::Sufficient { change: 0 });
	assert_eq!(s.fee, 141 + 459);
	assert_eq!(s.total_value, s.target + s.fee);

	// Change above the dust limit is untouched.
	let s =
		select_with_dust_handling(params, &utxos, 50_000, 1, 2, Strategy::LargestFirst).unwrap();

	assert_eq!(s.funding, Funding::Sufficient { change: 60_000 - 50_000 - 141 });
}
