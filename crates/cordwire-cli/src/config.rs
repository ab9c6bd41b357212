//! Config file and token resolution for the CLI.
//!
//! The config lives at `~/.cordwire/config.toml` unless `--config` points
//! elsewhere. The token never comes from the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cordwire_client::ClientConfig;

/// Environment variable read when `--token` is not given.
pub const TOKEN_ENV: &str = "CORDWIRE_TOKEN";

/// Path of the config file to load.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    match explicit {
        Some(path) => PathBuf::from(path),
        None => dirs::home_dir()
            .unwrap_or_default()
            .join(".cordwire")
            .join("config.toml"),
    }
}

/// Load the client config, falling back to defaults if the file is missing.
pub fn load(explicit: Option<&str>) -> Result<ClientConfig> {
    let path = config_path(explicit);
    ClientConfig::load(&path).with_context(|| format!("failed to load config at {}", path.display()))
}

/// The token to authenticate with.
pub fn require_token(token: Option<&str>) -> Result<String> {
    match token.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => anyhow::bail!("no token given: pass --token or set {TOKEN_ENV}"),
    }
}

/// Render the effective config as TOML.
pub fn render(config: &ClientConfig) -> Result<String> {
    toml::to_string_pretty(config).context("failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        assert_eq!(config_path(Some("/tmp/x.toml")), PathBuf::from("/tmp/x.toml"));
        assert!(config_path(None).ends_with(".cordwire/config.toml"));
    }

    #[test]
    fn token_is_required() {
        assert!(require_token(None).is_err());
        assert!(require_token(Some("  ")).is_err());
        assert_eq!(require_token(Some(" abc ")).unwrap(), "abc");
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.toml");
        let cfg = load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.gateway.api_version, 6);
    }

    #[test]
    fn load_bad_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[gateway\n").unwrap();
        let err = load(Some(path.to_str().unwrap())).unwrap_err();
        assert!(format!("{err:#}").contains("bad.toml"));
    }

    #[test]
    fn rendered_config_parses_back() {
        let rendered = render(&ClientConfig::default()).unwrap();
        let parsed = ClientConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.rest.base_url, ClientConfig::default().rest.base_url);
    }
}
