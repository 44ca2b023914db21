use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::rate_limit::RateLimitConfig;

/// Server settings, read from the environment (a `.env` file is honoured in debug builds).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub frontend_url: Option<String>,
    pub enable_hsts: bool,
    pub login_limit: RateLimitConfig,
    /// `username:password` of an admin created at start-up when absent.
    pub bootstrap_admin: Option<(String, String)>,
    pub database_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 characters long");
        }
        let data_dir = env::var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("data"));
        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("uploads"));
        let bootstrap_admin = match env::var("BOOTSTRAP_ADMIN") {
            Ok(raw) => {
                let (user, pass) = raw
                    .split_once(':')
                    .context("BOOTSTRAP_ADMIN must look like username:password")?;
                Some((user.to_string(), pass.to_string()))
            }
            Err(_) => None,
        };
        let defaults = RateLimitConfig::default();
        Ok(Self {
            jwt_secret,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir,
            upload_dir,
            frontend_url: env::var("FRONTEND_URL").ok(),
            enable_hsts: env_flag("ENABLE_HSTS"),
            login_limit: RateLimitConfig {
                login_limit: env_parse("LOGIN_RATE_LIMIT").unwrap_or(defaults.login_limit),
                login_window: env_parse("LOGIN_RATE_WINDOW")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.login_window),
            },
            bootstrap_admin,
            database_url: env::var("DATABASE_URL").ok(),
        })
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn rejects_short_secret_and_reads_overrides() {
        env::set_var("JWT_SECRET", "short");
        assert!(ServerConfig::from_env().is_err());

        env::set_var("JWT_SECRET", "0123456789abcdef0123456789abcdef");
        env::set_var("DATA_DIR", "/tmp/blogdesk-test");
        env::set_var("LOGIN_RATE_LIMIT", "3");
        env::set_var("BOOTSTRAP_ADMIN", "root:changeme");
        let cfg = ServerConfig::from_env().unwrap();
        assert_eq!(cfg.upload_dir, PathBuf::from("/tmp/blogdesk-test/uploads"));
        assert_eq!(cfg.login_limit.login_limit, 3);
        assert_eq!(cfg.bootstrap_admin, Some(("root".into(), "changeme".into())));

        for var in ["JWT_SECRET", "DATA_DIR", "LOGIN_RATE_LIMIT", "BOOTSTRAP_ADMIN"] {
            env::remove_var(var);
        }
    }
}
