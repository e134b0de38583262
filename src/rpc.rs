//! The narrow node capability the broadcaster depends on, injectable with a
//! test double so nothing here needs a live node.

// crates.io
use bitcoin::{consensus, Transaction, Txid};
// self
use crate::{prelude::*, signer, signer::SignatureMap};

/// Submit plus two diagnostics. The production implementation is
/// [`crate::api::mempool::Api`].
pub trait Rpc {
	async fn submit_raw_transaction(&self, tx_hex: String) -> Result<String>;

	async fn height(&self) -> Result<u64>;

	async fn ping(&self) -> Result<()>;
}

#[derive(Debug)]
pub struct Broadcaster<R>
where
	R: Rpc,
{
	pub rpc: R,
}
impl<R> Broadcaster<R>
where
	R: Rpc,
{
	/// Submits final transaction bytes; the node's rejection is surfaced
	/// verbatim. No retries happen here.
	pub async fn broadcast(&self, tx_bytes: &[u8]) -> Result<Txid> {
		let tx =
			consensus::deserialize::<Transaction>(tx_bytes).map_err(BitcoinError::Consensus)?;
		let txid = tx.compute_txid();
		let tx_hex = array_bytes::bytes2hex("", tx_bytes);

		tracing::info!("broadcasting {txid}");

		self.rpc.submit_raw_transaction(tx_hex).await?;

		Ok(txid)
	}

	/// Sign then broadcast.
	pub async fn send(&self, psbt_bytes: &[u8], signatures: &SignatureMap) -> Result<Txid> {
		let tx_bytes = signer::sign(psbt_bytes, signatures)?;

		self.broadcast(&tx_bytes).await
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::test_util;

	struct MockRpc {
		reject: Option<&'static str>,
	}
	impl Rpc for MockRpc {
		async fn submit_raw_transaction(&self, tx_hex: String) -> Result<String> {
			match self.reject {
				Some(reason) => Err(ApiError::BroadcastRejected(reason.into()))?,
				None => Ok(tx_hex),
			}
		}

		async fn height(&self) -> Result<u64> {
			Ok(0)
		}

		async fn ping(&self) -> Result<()> {
			Ok(())
		}
	}

	fn signed_tx_bytes() -> Vec<u8> {
		// crates.io
		use bitcoin::secp256k1::Message;
		// self
		use crate::signer::{sighash_key, signing_digests, TssSignature};

		let (psbt, keypair) = crate::signer::build_test_psbt(&[100_000]);
		let digests = signing_digests(&psbt).unwrap();
		let signatures = digests
			.iter()
			.map(|d| {
				let sig = test_util::SECP256K1
					.sign_ecdsa(&Message::from_digest(d.digest), &keypair.secret_key());

				(sighash_key(&d.digest), TssSignature {
					signature: sig.serialize_compact().to_vec(),
					recovery_id: 0,
				})
			})
			.collect();

		signer::sign(&psbt, &signatures).unwrap()
	}

	#[tokio::test]
	async fn broadcast_should_work() {
		let tx_bytes = signed_tx_bytes();
		let b = Broadcaster { rpc: MockRpc { reject: None } };

		assert!(b.broadcast(&tx_bytes).await.is_ok());
		assert_eq!(b.rpc.height().await.unwrap(), 0);
		assert!(b.rpc.ping().await.is_ok());
	}

	#[tokio::test]
	async fn broadcast_rejection_should_surface() {
		let tx_bytes = signed_tx_bytes();
		let b = Broadcaster { rpc: MockRpc { reject: Some("min relay fee not met") } };

		assert!(matches!(
			b.broadcast(&tx_bytes).await.unwrap_err(),
			Error::Api(ApiError::BroadcastRejected(r)) if r == "min relay fee not met"
		));
	}
}
