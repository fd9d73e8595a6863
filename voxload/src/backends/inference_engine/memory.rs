use anyhow::{Context, Result};
use std::{collections::BTreeMap, path::Path};
use tokio::fs;

use voxload_core::{backends::inference_engine::InferenceEngineBackend, models};

/// Engine stand-in that keeps track of what would be loaded.
///
/// It checks that every selected artifact exists before accepting a selection, so clients see the
/// same failures they would get from a real engine for missing uploads.
#[derive(Clone, Debug, Default)]
pub struct MemoryEngine {
    model_type: models::ModelType,
    loaded: Option<models::ModelSelection>,
    settings: BTreeMap<String, models::SettingValue>,
}

impl MemoryEngine {
    pub fn new() -> MemoryEngine {
        MemoryEngine::default()
    }

    fn snapshot(&self) -> models::ModelInfo {
        let path = |slot: &models::ArtifactSlot| slot.path().map(display_path);

        let settings = self
            .settings
            .iter()
            .map(|(key, value)| (key.clone(), value.clone().into()))
            .collect::<serde_json::Map<String, serde_json::Value>>();

        let info = models::ModelInfo::new()
            .with("status", "OK")
            .with("modelType", self.model_type.as_str())
            .with("settings", settings);

        match &self.loaded {
            Some(selection) => info
                .with("configFile", display_path(&selection.config))
                .with("pyTorchModelFile", path(&selection.pytorch_model))
                .with("onnxModelFile", path(&selection.onnx_model))
                .with("clusterTorchModelFile", path(&selection.cluster_model))
                .with("featureFile", path(&selection.feature))
                .with("indexFile", path(&selection.index))
                .with("isHalf", selection.is_half),
            None => info.with("configFile", serde_json::Value::Null),
        }
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[async_trait::async_trait]
impl InferenceEngineBackend for MemoryEngine {
    async fn load_model(
        &mut self,
        selection: &models::ModelSelection,
    ) -> Result<models::ModelInfo> {
        for path in selection.present_paths() {
            let metadata = fs::metadata(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;

            anyhow::ensure!(metadata.is_file(), "{} is not a file", path.display());
        }

        self.loaded = Some(selection.clone());

        Ok(self.snapshot())
    }

    async fn info(&self) -> Result<models::ModelInfo> {
        Ok(self.snapshot())
    }

    async fn update_settings(
        &mut self,
        key: &str,
        value: &models::SettingValue,
    ) -> Result<models::ModelInfo> {
        self.settings.insert(key.to_owned(), value.clone());

        Ok(self.snapshot())
    }

    async fn switch_model_type(
        &mut self,
        model_type: models::ModelType,
    ) -> Result<models::ModelInfo> {
        if self.model_type != model_type {
            // Weights of one family cannot be used by another.
            self.loaded = None;
            self.model_type = model_type;
        }

        Ok(self.snapshot())
    }

    async fn model_type(&self) -> Result<models::ModelTypeInfo> {
        Ok(models::ModelTypeInfo::ok(self.model_type))
    }
}
