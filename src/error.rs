pub mod api;
pub use api::*;

pub mod build;
pub use build::*;

pub mod chain;
pub use chain::*;

pub mod sign;
pub use sign::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Bitcoin(#[from] BitcoinError),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Secp256k1(#[from] bitcoin::secp256k1::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	Toml(#[from] toml::de::Error),

	#[error(transparent)]
	Api(#[from] ApiError),
	#[error(transparent)]
	Build(#[from] BuildError),
	#[error(transparent)]
	Chain(#[from] ChainError),
	#[error(transparent)]
	Sign(#[from] SignError),
}

#[derive(Debug, thiserror::Error)]
pub enum BitcoinError {
	#[error(transparent)]
	Consensus(#[from] bitcoin::consensus::encode::Error),
	#[error(transparent)]
	HexToArray(#[from] bitcoin::hex::HexToArrayError),
	#[error(transparent)]
	Parse(#[from] bitcoin::address::ParseError),
	#[error(transparent)]
	Psbt(#[from] bitcoin::psbt::Error),
	#[error(transparent)]
	PushBytes(#[from] bitcoin::script::PushBytesError),
}
