use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::Result;
use serde::Deserialize;

pub const DEFAULT_TOKEN_URL: &str = "https://auth.streamingfast.io/v1/auth/issue";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub firehose: FirehoseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FirehoseConfig {
    pub chain: Chain,
    /// Exchanged for a bearer token at `token_url`. Without it requests go out unauthenticated.
    pub api_key: Option<String>,
    pub token_url: String,
    pub token_lifetime_secs: u64,
    /// Per-chain overrides of the built-in endpoints
    #[serde(default)]
    pub endpoints: HashMap<Chain, EndpointConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub plaintext: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Mainnet,
    Goerli,
    Sepolia,
}

impl Chain {
    pub fn default_endpoint(&self) -> EndpointConfig {
        let url = match self {
            Chain::Mainnet => "https://mainnet.eth.streamingfast.io:443",
            Chain::Goerli => "https://goerli.eth.streamingfast.io:443",
            Chain::Sepolia => "https://sepolia.eth.streamingfast.io:443",
        };
        EndpointConfig {
            url: url.to_string(),
            plaintext: false,
        }
    }
}

impl FirehoseConfig {
    /// Endpoint for the configured chain, honouring overrides.
    pub fn endpoint(&self) -> EndpointConfig {
        self.endpoints
            .get(&self.chain)
            .cloned()
            .unwrap_or_else(|| self.chain.default_endpoint())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let config_builder = Self::defaults()?
            // Optional config file in the working directory
            .add_source(config::File::with_name("config").required(false))
            // Environment variables, e.g. FIREHOSE_EVENTS__FIREHOSE__API_KEY
            .add_source(config::Environment::with_prefix("FIREHOSE_EVENTS").separator("__"))
            .build()?;

        let config: Config = config_builder.try_deserialize()?;
        Ok(config)
    }

    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = Self::defaults()?
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("service.host", "0.0.0.0")?
            .set_default("service.port", 9000)?
            .set_default("service.log_level", "info")?
            .set_default("firehose.chain", "mainnet")?
            .set_default("firehose.token_url", DEFAULT_TOKEN_URL)?
            .set_default("firehose.token_lifetime_secs", 86_400)?)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.service.host, self.service.port).parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.service.port, 9000);
        assert_eq!(config.firehose.chain, Chain::Mainnet);
        assert_eq!(config.firehose.token_url, DEFAULT_TOKEN_URL);
        assert!(config.firehose.api_key.is_none());
        assert_eq!(config.firehose.endpoint(), Chain::Mainnet.default_endpoint());
        assert_eq!(config.listen_addr().unwrap().port(), 9000);
    }

    #[test]
    fn test_endpoint_override() {
        let config = Config::from_toml(
            r#"
            [service]
            port = 7777

            [firehose]
            chain = "goerli"
            api_key = "server_123"

            [firehose.endpoints.goerli]
            url = "http://localhost:10015"
            plaintext = true
            "#,
        )
        .unwrap();

        assert_eq!(config.service.port, 7777);
        assert_eq!(config.firehose.chain, Chain::Goerli);
        assert_eq!(config.firehose.api_key.as_deref(), Some("server_123"));
        let endpoint = config.firehose.endpoint();
        assert_eq!(endpoint.url, "http://localhost:10015");
        assert!(endpoint.plaintext);
    }
}
