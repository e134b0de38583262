//! Minimal HTTP capability consumed by the API bindings.
//!
//! Deliberately retry-free; retry and backoff policy belongs to the caller,
//! as does any timeout/cancellation boundary around these calls.

// crates.io
use bytes::Bytes;
use reqwest::{Body, Client as RClient, ClientBuilder, IntoUrl};
use serde::de::DeserializeOwned;
// self
use crate::prelude::*;

#[derive(Debug)]
pub struct Response {
	pub status: u16,
	pub body: Bytes,
}
impl Response {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub fn json<D>(&self) -> Result<D>
	where
		D: DeserializeOwned,
	{
		match serde_json::from_slice(&self.body) {
			Ok(d) => Ok(d),
			Err(e) => {
				tracing::error!("{}", String::from_utf8_lossy(&self.body));

				Err(e)?
			},
		}
	}

	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into()
	}
}

pub trait Http {
	async fn get<U>(&self, uri: U) -> Result<Response>
	where
		U: IntoUrl + Send;

	async fn post<U, B>(&self, uri: U, body: B) -> Result<Response>
	where
		U: IntoUrl + Send,
		B: Into<Body> + Send;
}

#[derive(Debug)]
pub struct Client(pub RClient);
impl Client {
	pub fn new(user_agent: &str) -> Result<Self> {
		Ok(Self(ClientBuilder::new().user_agent(user_agent).build()?))
	}
}
impl Http for Client {
	async fn get<U>(&self, uri: U) -> Result<Response>
	where
		U: IntoUrl + Send,
	{
		let r = self.0.get(uri).send().await?;
		let status = r.status().as_u16();

		Ok(Response { status, body: r.bytes().await? })
	}

	async fn post<U, B>(&self, uri: U, body: B) -> Result<Response>
	where
		U: IntoUrl + Send,
		B: Into<Body> + Send,
	{
		let r = self.0.post(uri).body(body).send().await?;
		let status = r.status().as_u16();

		Ok(Response { status, body: r.bytes().await? })
	}
}

#[test]
fn response_json_should_work() {
	let r = Response { status: 200, body: Bytes::from_static(b"[1,2,3]") };

	assert!(r.is_success());
	assert_eq!(r.json::<Vec<u32>>().unwrap(), [1, 2, 3]);

	let r = Response { status: 400, body: Bytes::from_static(b"bad-txn-mempool-conflict") };

	assert!(!r.is_success());
	assert_eq!(r.text(), "bad-txn-mempool-conflict");
}
