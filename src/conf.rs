// std
use std::{fs, path::Path};
// crates.io
use bitcoin::Network;
use serde::{Deserialize, Serialize};
// self
use crate::{chain::Chain, prelude::*, select::Strategy};

const DEFAULT_CONF: &str = r#"# Chain to build transactions for.
# Possible values: "bitcoin", "bitcoin-cash", "dogecoin", "litecoin", "zcash".
chain = "bitcoin"

# Network configuration.
# Possible values: "bitcoin", "testnet", "signet", "regtest".
network = "testnet"

# UTXO selection strategy.
# Possible values: "largest-first", "smallest-first", "select-all".
strategy = "largest-first"

[api]
# Esplora-compatible endpoint used to source UTXOs and broadcast.
base-uri = "https://mempool.space/testnet/api"
user-agent = "tss-utxo-builder"
"#;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Conf {
	pub api: ApiConf,
	pub chain: Chain,
	pub network: Network,
	pub strategy: Strategy,
}
impl Conf {
	/// Loads the configuration, writing a commented template at `path` on
	/// first run and falling back to the defaults it describes.
	pub fn load_from(path: &Path) -> Result<Self> {
		if path.is_file() {
			Ok(toml::from_str(&fs::read_to_string(path)?)?)
		} else {
			tracing::info!(
				"no configuration file found, \
				a template has been generated, \
				please configure it at {path:?}"
			);
			fs::write(path, DEFAULT_CONF)?;

			Ok(Self::default())
		}
	}
}
impl Default for Conf {
	fn default() -> Self {
		toml::from_str(DEFAULT_CONF).unwrap()
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConf {
	pub base_uri: String,
	pub user_agent: String,
}

#[test]
fn default_conf_should_work() {
	let c = Conf::default();

	assert!(matches!(c.chain, Chain::Bitcoin));
	assert!(matches!(c.network, Network::Testnet));
	assert!(matches!(c.strategy, Strategy::LargestFirst));
	assert_eq!(c.api.base_uri, "https://mempool.space/testnet/api");
}
