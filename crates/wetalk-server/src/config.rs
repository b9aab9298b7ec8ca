use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Known placeholder secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "",
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub jwt_secret: String,
    pub allowed_origins: Vec<String>,
    /// Credentials for the external mail service. Carried for that
    /// collaborator; nothing in this server sends mail.
    pub mail_user: Option<String>,
    pub mail_password: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("WETALK_JWT_SECRET").unwrap_or_default();
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!(
                "WETALK_JWT_SECRET is unset or still a placeholder; \
                 it must match the secret the auth service signs tokens with"
            );
        }

        let host = var("WETALK_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("WETALK_PORT")
            .unwrap_or_else(|| "4000".into())
            .parse()
            .context("WETALK_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let allowed_origins: Vec<String> = var("WETALK_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ORIGIN.into())
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            db_path: PathBuf::from(var("WETALK_DB_PATH").unwrap_or_else(|| "wetalk.db".into())),
            addr,
            jwt_secret,
            allowed_origins,
            mail_user: var("WETALK_MAIL_USER"),
            mail_password: var("WETALK_MAIL_PASSWORD"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = load(&[("WETALK_JWT_SECRET", "s3cr3t-value")]).unwrap();

        assert_eq!(config.addr.port(), 4000);
        assert_eq!(config.db_path, PathBuf::from("wetalk.db"));
        assert_eq!(config.allowed_origins, vec!["http://localhost:5173"]);
        assert!(config.mail_user.is_none());
    }

    #[test]
    fn placeholder_secrets_are_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("WETALK_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let config = load(&[
            ("WETALK_JWT_SECRET", "s3cr3t-value"),
            ("WETALK_ALLOWED_ORIGINS", "https://a.example/, https://b.example,,"),
            ("WETALK_PORT", "8080"),
        ])
        .unwrap();

        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.addr.port(), 8080);
    }

    #[test]
    fn bad_port_is_an_error() {
        let result = load(&[("WETALK_JWT_SECRET", "s3cr3t-value"), ("WETALK_PORT", "http")]);
        assert!(result.is_err());
    }
}
