use std::time::Duration;

use anyhow::{Context, bail};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SurrealAdapter {
    config: DbConfig,
}

impl SurrealAdapter {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    /// Cheap reachability probe run before handing the endpoint to the
    /// repositories, so a dead store fails startup instead of the first
    /// request.
    pub async fn health_check(&self) -> anyhow::Result<()> {
        let address = parse_socket_address(&self.config.endpoint)?;
        let connect = timeout(Duration::from_secs(2), TcpStream::connect(&address)).await;
        let Ok(connect) = connect else {
            bail!("surreal endpoint connect timed out");
        };
        connect.context("surreal endpoint connect failed")?;

        tracing::debug!(
            endpoint = self.config.endpoint,
            namespace = self.config.namespace,
            database = self.config.database,
            "surreal health check succeeded"
        );
        Ok(())
    }
}

fn parse_socket_address(endpoint: &str) -> anyhow::Result<String> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    let parsed =
        Url::parse(&normalized).with_context(|| format!("invalid surreal endpoint '{endpoint}'"))?;

    let scheme = parsed.scheme();
    let host = parsed
        .host_str()
        .with_context(|| format!("missing surreal host in endpoint '{endpoint}'"))?;
    let port = parsed.port_or_known_default().unwrap_or(match scheme {
        "wss" | "https" => 443,
        _ => 8000,
    });
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_host_as_ws() {
        assert_eq!(
            parse_socket_address("127.0.0.1:8000").expect("parse"),
            "127.0.0.1:8000"
        );
    }

    #[test]
    fn parses_scheme_defaults() {
        assert_eq!(
            parse_socket_address("wss://db.farbound.example").expect("parse"),
            "db.farbound.example:443"
        );
    }
}
