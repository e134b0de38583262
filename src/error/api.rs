#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error("[api] node rejected transaction: {0}")]
	BroadcastRejected(String),
	#[error("[api] unexpected response, status {status}: {body}")]
	UnexpectedResponse { status: u16, body: String },
}
