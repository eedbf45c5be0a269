use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::envelope::Uid;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_url: String,
    pub room: String,
    pub display_name: String,
    /// Stable identity; generated per run when absent.
    #[serde(default)]
    pub uid: Option<Uid>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut cfg: Config = serde_json::from_str(&data).context("parse config json")?;
        cfg.config_path = Some(path.to_path_buf());
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    fn normalize(&mut self) {
        self.room = self.room.to_lowercase();
        self.server_url = self.server_url.trim_end_matches('/').to_string();
    }

    fn validate(&self) -> Result<()> {
        validate_url(&self.server_url).context("server_url")?;
        validate_room(&self.room)?;
        if self.display_name.trim().is_empty() {
            anyhow::bail!("display_name must not be empty");
        }
        Ok(())
    }
}

pub fn default_log_file_path() -> PathBuf {
    std::env::temp_dir().join("roomlink").join("roomlink.log")
}

fn validate_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("url must be http or https");
    }
    Ok(())
}

fn validate_room(room: &str) -> Result<()> {
    static PATTERN: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap());
    if PATTERN.is_match(room) {
        Ok(())
    } else {
        anyhow::bail!("invalid room name: {room}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn load_config_from_json_and_normalize() {
        let tmp = env::temp_dir().join("roomlink-config-test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        let cfg_path = tmp.join("config.json");
        let json = r#"{
            "server_url": "http://127.0.0.1:8000/",
            "room": "Kitchen",
            "display_name": "alice",
            "uid": 11
        }"#;
        fs::write(&cfg_path, json).unwrap();

        let cfg = Config::load(&cfg_path).unwrap();
        assert_eq!(cfg.server_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.room, "kitchen");
        assert_eq!(cfg.uid, Some(11));
        assert_eq!(cfg.config_path.as_ref().unwrap(), &cfg_path);
    }

    #[test]
    fn reject_invalid_url_scheme() {
        let tmp = env::temp_dir().join("roomlink-config-test-bad-url");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        let cfg_path = tmp.join("config.json");
        let json = r#"{
            "server_url": "ftp://bad.example.com",
            "room": "kitchen",
            "display_name": "alice"
        }"#;
        fs::write(&cfg_path, json).unwrap();
        let err = Config::load(&cfg_path).unwrap_err();
        assert!(err.to_string().contains("server_url"));
    }

    #[test]
    fn reject_invalid_room_name() {
        let tmp = env::temp_dir().join("roomlink-config-test-bad-room");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        let cfg_path = tmp.join("config.json");
        let json = r#"{
            "server_url": "http://localhost:8000",
            "room": "no spaces here",
            "display_name": "alice"
        }"#;
        fs::write(&cfg_path, json).unwrap();
        let err = Config::load(&cfg_path).unwrap_err();
        assert!(err.to_string().contains("invalid room name"));
    }
}
