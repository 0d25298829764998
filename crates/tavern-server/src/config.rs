use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use tavern_completion::client::DEFAULT_ENDPOINT;

const DEV_PEPPER: &str = "dev-pepper-change-me";

const PLACEHOLDER_SECRETS: &[&str] = &[DEV_PEPPER, "change-me-to-a-random-string"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub production: bool,
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub token_pepper: String,
    pub dev_tokens: bool,
    pub completion_api_key: Option<String>,
    pub completion_url: String,
    pub entitlement_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let production = match var("TAVERN_ENV").as_deref() {
            None | Some("development") => false,
            Some("production") => true,
            Some(other) => bail!("TAVERN_ENV must be development or production, got {:?}", other),
        };

        let host = var("TAVERN_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("TAVERN_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("TAVERN_PORT is not a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let token_pepper = var("TAVERN_TOKEN_PEPPER").unwrap_or_else(|| DEV_PEPPER.into());
        if production && PLACEHOLDER_SECRETS.contains(&token_pepper.as_str()) {
            bail!("TAVERN_TOKEN_PEPPER is unset or still a placeholder");
        }

        let dev_tokens = match var("TAVERN_DEV_TOKENS") {
            Some(v) => parse_bool(&v).with_context(|| format!("TAVERN_DEV_TOKENS: {:?}", v))?,
            None => !production,
        };

        Ok(Self {
            production,
            addr,
            db_path: var("TAVERN_DB_PATH").unwrap_or_else(|| "tavern.db".into()).into(),
            token_pepper,
            dev_tokens,
            completion_api_key: var("OPENROUTER_API_KEY"),
            completion_url: var("TAVERN_COMPLETION_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.into()),
            entitlement_url: var("TAVERN_ENTITLEMENT_URL"),
        })
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("expected a boolean"),
    }
}
