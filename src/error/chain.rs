// self
use crate::types::Satoshi;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
	#[error("[chain] insufficient funds: short {shortfall}, required {required}, available {available}")]
	InsufficientFunds { required: Satoshi, available: Satoshi, shortfall: Satoshi },
}
