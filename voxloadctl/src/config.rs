use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tokio::fs;

const QUALIFIER: &str = "io";
const ORGANIZATION: &str = "Voxload";
const APPLICATION: &str = "voxloadctl";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_FILE_TEMP: &str = "config.toml~";

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:18888";
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    pub upload: ConfigUpload,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ConfigUpload {
    pub server: Option<String>,
    pub chunk_size: Option<u64>,
}

impl Config {
    /// Command line values win over the config file.
    pub fn server(&self, server: Option<&str>) -> String {
        server
            .or(self.upload.server.as_deref())
            .unwrap_or(DEFAULT_SERVER)
            .to_owned()
    }

    pub fn chunk_size(&self, chunk_size: Option<u64>) -> Result<u64> {
        match chunk_size.or(self.upload.chunk_size).unwrap_or(DEFAULT_CHUNK_SIZE) {
            0 => Err(anyhow!("chunk size must be at least one byte")),
            chunk_size => Ok(chunk_size),
        }
    }

    pub async fn save(&self) -> Result<PathBuf> {
        match get_config_file_path() {
            Some(config_file_path) => {
                self.save_to(&config_file_path).await?;
                Ok(config_file_path)
            }
            None => Err(anyhow!(
                "there is no default location for the config file on this platform"
            )),
        }
    }

    async fn save_to(&self, config_file_path: &Path) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let buffer = toml::to_vec(&self).context("serializing config")?;

        let dir = config_file_path
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent", config_file_path.display()))?;
        fs::create_dir_all(dir)
            .await
            .context("creating config dir")?;

        let temp_path = dir.join(CONFIG_FILE_TEMP);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .await?;

        file.write_all(&buffer)
            .await
            .context("writing temp config")?;

        file.flush().await.context("flushing temp config")?;

        fs::rename(&temp_path, config_file_path)
            .await
            .context("moving temp config")?;

        Ok(())
    }
}

fn get_config_file_path() -> Option<PathBuf> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|project_dirs| project_dirs.config_dir().join(CONFIG_FILE))
}

pub async fn read_default() -> Result<Config> {
    if let Some(config_file_path) = get_config_file_path() {
        read_from(&config_file_path).await
    } else {
        tracing::warn!("there is no default location for the config file on this platform");
        tracing::info!("using the default config instead");
        Ok(Config::default())
    }
}

async fn read_from(config_file_path: &Path) -> Result<Config> {
    use std::io::ErrorKind;

    match fs::read(config_file_path).await {
        Ok(data) => {
            let config = toml::from_slice(&data).context("parsing config")?;
            Ok(config)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Config::default()),
        Err(err) => Err(err).context("reading config")?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("voxloadctl").join(CONFIG_FILE);

        assert_eq!(read_from(&path).await.unwrap(), Config::default());

        let config = Config {
            upload: ConfigUpload {
                server: Some("http://gpu-box:18888".into()),
                chunk_size: Some(4096),
            },
        };
        config.save_to(&path).await.unwrap();

        assert_eq!(read_from(&path).await.unwrap(), config);
        assert!(!path.with_file_name(CONFIG_FILE_TEMP).exists());
    }

    #[test]
    fn test_command_line_wins() {
        let config = Config {
            upload: ConfigUpload {
                server: Some("http://gpu-box:18888".into()),
                chunk_size: None,
            },
        };

        assert_eq!(config.server(None), "http://gpu-box:18888");
        assert_eq!(config.server(Some("http://localhost:1")), "http://localhost:1");
        assert_eq!(config.chunk_size(None).unwrap(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.chunk_size(Some(10)).unwrap(), 10);
        assert!(config.chunk_size(Some(0)).is_err());
    }
}
