//! Rust bindings for the [Mempool API](https://mempool.space/docs/api/rest),
//! the production implementation of the broadcast capability.

// crates.io
use serde::Deserialize;
// self
use crate::{http::*, prelude::*, rpc::Rpc, types::*};

#[derive(Debug)]
pub struct Api<H>
where
	H: Http,
{
	pub http: H,
	pub base_uri: String,
}
impl Api<Client> {
	pub fn new(base_uri: &str, user_agent: &str) -> Result<Self> {
		Ok(Self { http: Client::new(user_agent)?, base_uri: base_uri.into() })
	}
}
impl<H> Api<H>
where
	H: Http,
{
	// Get the list of unspent transaction outputs associated with the
	// address. Available fields: `txid`, `vout`, `value`, and `status` (with
	// the status of the funding tx).
	pub async fn get_utxos<S>(&self, address: S) -> Result<Vec<Utxo>>
	where
		S: AsRef<str>,
	{
		let r =
			self.http.get(format!("{}/address/{}/utxo", self.base_uri, address.as_ref())).await?;

		if !r.is_success() {
			Err(ApiError::UnexpectedResponse { status: r.status, body: r.text() })?;
		}

		let utxos = r.json::<Vec<Utxo>>()?;

		tracing::debug!("get_utxos\n{utxos:?}");

		Ok(utxos)
	}

	pub async fn get_utxos_confirmed<S>(&self, address: S) -> Result<Vec<Utxo>>
	where
		S: AsRef<str>,
	{
		let utxos =
			self.get_utxos(address).await?.into_iter().filter(|u| u.status.confirmed).collect();

		tracing::debug!("get_utxos_confirmed\n{utxos:?}");

		Ok(utxos)
	}

	pub async fn get_height(&self) -> Result<u64> {
		let r = self.http.get(format!("{}/blocks/tip/height", self.base_uri)).await?;

		if !r.is_success() {
			Err(ApiError::UnexpectedResponse { status: r.status, body: r.text() })?;
		}

		Ok(r.json()?)
	}

	// Broadcast a raw transaction to the network. The transaction should be
	// provided as hex in the request body. The `txid` will be returned on
	// success; the node's rejection reason is surfaced verbatim on failure.
	pub async fn broadcast<S>(&self, tx_hex: S) -> Result<String>
	where
		S: Into<String>,
	{
		let r = self.http.post(format!("{}/tx", self.base_uri), tx_hex.into()).await?;

		if !r.is_success() {
			Err(ApiError::BroadcastRejected(r.text()))?;
		}

		Ok(r.text())
	}
}
impl<H> Rpc for Api<H>
where
	H: Http,
{
	async fn submit_raw_transaction(&self, tx_hex: String) -> Result<String> {
		self.broadcast(tx_hex).await
	}

	async fn height(&self) -> Result<u64> {
		self.get_height().await
	}

	async fn ping(&self) -> Result<()> {
		self.get_height().await.map(|_| ())
	}
}

#[derive(Debug, Deserialize)]
pub struct Utxo {
	pub status: Status,
	pub txid: String,
	pub value: Satoshi,
	pub vout: Index,
}
#[derive(Debug, Deserialize)]
pub struct Status {
	pub confirmed: bool,
}
