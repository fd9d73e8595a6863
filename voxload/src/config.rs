use anyhow::{Context, Result};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;

const DEFAULT_CONFIG_NAME: &str = "voxload";
const ENV_PREFIX: &str = "VOXLOAD";

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen_addr: SocketAddr,
    /// Staging area for fragments and finished uploads.
    pub upload_dir: PathBuf,
    /// Destination of training weights.
    pub model_dir: PathBuf,
    /// Destination of extracted training datasets.
    pub dataset_dir: PathBuf,
    pub max_chunk_bytes: u64,
    pub fragment_ttl_secs: u64,
    /// Zero disables the periodic sweep.
    pub sweep_interval_secs: u64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 18888)),
            upload_dir: PathBuf::from("upload_dir"),
            model_dir: PathBuf::from("MMVC_Trainer/logs"),
            dataset_dir: PathBuf::from("MMVC_Trainer/dataset/textful"),
            max_chunk_bytes: 8 * 1024 * 1024,
            fragment_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
            log_level: "info".into(),
        }
    }
}

impl Settings {
    pub fn fragment_ttl(&self) -> Duration {
        Duration::from_secs(self.fragment_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub async fn create_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.model_dir, &self.dataset_dir] {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }

        Ok(())
    }
}

/// Reads the settings from `path`, or from an optional `voxload.{toml,json}` in the working
/// directory. `VOXLOAD_*` environment variables override both.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let file = match path {
        Some(path) => ::config::File::from(path).required(true),
        None => ::config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
    };

    let settings = ::config::Config::builder()
        .add_source(file)
        .add_source(::config::Environment::with_prefix(ENV_PREFIX))
        .build()
        .context("reading config")?
        .try_deserialize()
        .context("parsing config")?;

    Ok(settings)
}
