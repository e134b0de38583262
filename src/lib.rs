//! TSS UTXO Builder
//!
//! Builds, fee-prices, coin-selects and assembles Bitcoin-family transactions
//! whose signatures are produced by an external threshold-signing subsystem.
//! The crate never touches a private key: it hands out per-input signing
//! digests, reconciles the returned signatures against those digests, and
//! finalizes the transaction for broadcast.

#![deny(
	// clippy::all,
	// missing_docs,
	unused_crate_dependencies,
	// warnings,
)]

pub mod api;
pub mod builder;
pub mod chain;
pub mod conf;
pub mod error;
pub mod fee;
pub mod http;
pub mod output;
pub mod rpc;
pub mod select;
pub mod signer;
pub mod types;

pub mod prelude {
	pub use crate::error::*;

	pub type Result<T> = std::result::Result<T, Error>;
}

#[cfg(test)]
mod test_util {
	// crates.io
	use bitcoin::{
		key::Keypair,
		secp256k1::{All, Secp256k1, SecretKey},
	};
	use once_cell::sync::Lazy;

	pub static SECP256K1: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

	pub fn keypair(seed: u8) -> Keypair {
		let sk = SecretKey::from_slice(&[seed; 32]).unwrap();

		Keypair::from_secret_key(&SECP256K1, &sk)
	}

	pub fn init_tracing() {
		let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	}
}
