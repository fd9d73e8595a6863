use std::path::PathBuf;

use crate::{
    error::{Result, UploadError},
    models,
};

/// Maps client supplied artifact filenames onto paths in the upload directory.
///
/// This is the only place that knows about the sentinel. Existence is not checked here, missing
/// or malformed files are reported by the engine when it loads them.
#[derive(Clone, Debug)]
pub struct ArtifactResolver {
    upload_dir: PathBuf,
}

impl ArtifactResolver {
    pub fn new(upload_dir: impl Into<PathBuf>) -> ArtifactResolver {
        ArtifactResolver {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn resolve_paths(&self, fields: &models::ArtifactFields) -> Result<models::ModelSelection> {
        if fields.config == models::SENTINEL {
            return Err(UploadError::invalid_request("config file is required"));
        }

        let config = models::LogicalFilename::parse(fields.config.as_str())
            .map_err(|err| field_error("config", err))?;

        Ok(models::ModelSelection {
            config: self.upload_dir.join(config.as_str()),
            pytorch_model: self.resolve_slot("pytorch model", &fields.pytorch_model)?,
            onnx_model: self.resolve_slot("onnx model", &fields.onnx_model)?,
            cluster_model: self.resolve_slot("cluster model", &fields.cluster_model)?,
            feature: self.resolve_slot("feature file", &fields.feature)?,
            index: self.resolve_slot("index file", &fields.index)?,
            is_half: fields.is_half,
        })
    }

    fn resolve_slot(&self, field: &str, value: &str) -> Result<models::ArtifactSlot> {
        if value == models::SENTINEL {
            return Ok(models::ArtifactSlot::Absent);
        }

        let filename =
            models::LogicalFilename::parse(value).map_err(|err| field_error(field, err))?;

        Ok(models::ArtifactSlot::Present(
            self.upload_dir.join(filename.as_str()),
        ))
    }
}

fn field_error(field: &str, err: UploadError) -> UploadError {
    match err {
        UploadError::InvalidRequest(message) => {
            UploadError::InvalidRequest(format!("{}: {}", field, message))
        }
        err => err,
    }
}
