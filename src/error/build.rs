#[derive(Debug, thiserror::Error)]
pub enum BuildError {
	#[error("[build] no spendable UTXOs supplied")]
	NoUtxos,
	#[error("[build] fee rate must be positive")]
	ZeroFeeRate,
	#[error("[build] expected a 33-byte compressed public key, got {0} bytes")]
	InvalidPublicKey(usize),
	#[error("[build] no outputs requested")]
	NoOutputs,
	#[error("[build] data payload too large: max {max}, actual {actual}")]
	PayloadTooLarge { max: usize, actual: usize },
	#[error("[build] swap memo must not be empty")]
	EmptyMemo,
	#[error("[build] unsupported output type on {chain}: {kind}")]
	UnsupportedOutputType { chain: &'static str, kind: String },
}
