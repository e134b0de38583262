#[derive(Debug, thiserror::Error)]
pub enum SignError {
	#[error("[sign] malformed psbt: {0}")]
	Parse(bitcoin::psbt::Error),
	#[error("[sign] psbt carries no unsigned transaction inputs")]
	MissingUnsignedTx,
	#[error("[sign] sighash computation failed for input {input}: {reason}")]
	SighashCompute { input: usize, reason: String },
	#[error("[sign] unsupported sighash flag {flag:#04x} for input {input}")]
	UnsupportedSighashFlag { input: usize, flag: u32 },
	#[error("[sign] no signature supplied for input {input} (key {key})")]
	MissingSignature { input: usize, key: String },
	#[error("[sign] input {input} does not resolve to exactly one 33-byte signer key")]
	MissingPublicKey { input: usize },
	#[error("[sign] signature for input {input} does not verify against the signer key")]
	SignatureMismatch { input: usize },
	#[error("[sign] cannot finalize input {input}: {reason}")]
	Finalize { input: usize, reason: String },
	#[error("[sign] cannot extract the signed transaction: {0}")]
	Serialize(bitcoin::psbt::ExtractTxError),
}
