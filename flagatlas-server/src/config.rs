use std::path::PathBuf;

pub const DEFAULT_DATABASE: &str = "flagatlas.db";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Server settings read from `FLAGATLAS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database: PathBuf,
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values and unparsable ports fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        ServerConfig {
            database: get("FLAGATLAS_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            host: get("FLAGATLAS_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: get("FLAGATLAS_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(DEFAULT_PORT),
        }
    }
}
