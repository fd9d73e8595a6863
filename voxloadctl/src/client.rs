use anyhow::{anyhow, Context, Result};
use reqwest::{Response, Url};
use serde_json::Value;
use std::path::Path;
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt},
};

/// Sends files to a voxload server in chunks and drives the model endpoints.
#[derive(Clone, Debug)]
pub struct UploadClient {
    http: reqwest::Client,
    base: Url,
}

/// Names of the artifacts to load, `None` is sent as the `-` placeholder.
#[derive(Clone, Debug, Default)]
pub struct LoadModel<'a> {
    pub config: &'a str,
    pub pytorch_model: Option<&'a str>,
    pub onnx_model: Option<&'a str>,
    pub cluster_model: Option<&'a str>,
    pub feature: Option<&'a str>,
    pub index: Option<&'a str>,
    pub is_half: bool,
}

impl UploadClient {
    pub fn new(server: &str) -> Result<UploadClient> {
        let base = Url::parse(server).with_context(|| format!("parsing server url {}", server))?;

        Ok(UploadClient {
            http: reqwest::Client::new(),
            base,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("building url for {}", path))
    }

    /// Uploads every chunk of `path` under `name` and returns how many were sent. At least one
    /// chunk is always sent so empty files can be reassembled too.
    pub async fn upload_chunks(&self, path: &Path, name: &str, chunk_size: u64) -> Result<u32> {
        let mut file = File::open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;

        let mut index = 0u32;
        loop {
            let chunk = read_chunk(&mut file, chunk_size)
                .await
                .with_context(|| format!("reading {}", path.display()))?;

            if chunk.is_empty() && index > 0 {
                break;
            }

            let last = (chunk.len() as u64) < chunk_size;

            tracing::debug!(name, index, bytes = chunk.len(), "uploading chunk");

            let res = self
                .http
                .post(self.url("upload_file")?)
                .query(&[("filename", name), ("index", index.to_string().as_str())])
                .body(chunk)
                .send()
                .await?;
            check(res).await?;

            index += 1;

            if last {
                break;
            }
        }

        Ok(index)
    }

    pub async fn concat(&self, name: &str, chunks: u32) -> Result<Value> {
        self.post_form(
            "concat_uploaded_file",
            &[("filename", name), ("filenameChunkNum", chunks.to_string().as_str())],
        )
        .await
    }

    pub async fn extract_voices(&self, name: &str, chunks: u32) -> Result<Value> {
        self.post_form(
            "extract_voices",
            &[("zipFilename", name), ("zipFileChunkNum", chunks.to_string().as_str())],
        )
        .await
    }

    pub async fn load_model(&self, load: &LoadModel<'_>) -> Result<Value> {
        let or_placeholder = |name: Option<&str>| name.unwrap_or("-").to_owned();

        self.post_form(
            "load_model",
            &[
                ("pyTorchModelFilename", or_placeholder(load.pytorch_model).as_str()),
                ("onnxModelFilename", or_placeholder(load.onnx_model).as_str()),
                ("configFilename", load.config),
                ("clusterTorchModelFilename", or_placeholder(load.cluster_model).as_str()),
                ("featureFilename", or_placeholder(load.feature).as_str()),
                ("indexFilename", or_placeholder(load.index).as_str()),
                ("isHalf", if load.is_half { "true" } else { "false" }),
            ],
        )
        .await
    }

    pub async fn switch_model_type(&self, model_type: &str) -> Result<Value> {
        self.post_form("model_type", &[("modelType", model_type)]).await
    }

    pub async fn model_type(&self) -> Result<Value> {
        self.get("model_type").await
    }

    pub async fn info(&self) -> Result<Value> {
        self.get("info").await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let res = self.http.get(self.url(path)?).send().await?;
        check(res).await
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value> {
        let res = self.http.post(self.url(path)?).form(form).send().await?;
        check(res).await
    }
}

async fn check(res: Response) -> Result<Value> {
    let status = res.status();
    let body = res.json::<Value>().await.context("decoding response")?;

    if status.is_success() {
        Ok(body)
    } else {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        Err(anyhow!("server returned {}: {}", status, message))
    }
}

/// Reads until `chunk_size` bytes are buffered or the reader is exhausted.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, chunk_size: u64) -> Result<Vec<u8>> {
    let mut chunk = Vec::new();
    reader.take(chunk_size).read_to_end(&mut chunk).await?;
    Ok(chunk)
}
