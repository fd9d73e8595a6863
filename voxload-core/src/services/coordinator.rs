use std::path::Path;
use tokio::sync::RwLock;

use crate::{
    backends::InferenceEngine,
    error::{Result, UploadError},
    models,
};

/// Owns the handle to the inference engine.
///
/// The engine is the single writer of the loaded model. Loads, switches and setting updates take
/// the write lock and run one at a time in arrival order, queries take the read lock. A query never
/// observes a load that is halfway done.
#[derive(Debug)]
pub struct ModelLoadCoordinator {
    engine: RwLock<InferenceEngine>,
}

impl ModelLoadCoordinator {
    pub fn new(engine: InferenceEngine) -> ModelLoadCoordinator {
        ModelLoadCoordinator {
            engine: RwLock::new(engine),
        }
    }

    pub async fn load_model(&self, selection: &models::ModelSelection) -> Result<models::ModelInfo> {
        if selection.config.file_name().is_none() {
            return Err(UploadError::invalid_request(format!(
                "config path {} does not name a file",
                selection.config.display()
            )));
        }

        let mut engine = self.engine.write().await;

        tracing::info!(
            config = %selection.config.display(),
            pytorch_model = selection.pytorch_model.is_present(),
            onnx_model = selection.onnx_model.is_present(),
            cluster_model = selection.cluster_model.is_present(),
            feature = selection.feature.is_present(),
            index = selection.index.is_present(),
            is_half = selection.is_half,
            "loading model"
        );

        engine
            .load_model(selection)
            .await
            .map_err(UploadError::Engine)
    }

    pub async fn switch_model_type(
        &self,
        model_type: models::ModelType,
    ) -> Result<models::ModelInfo> {
        let mut engine = self.engine.write().await;

        tracing::info!(model_type = %model_type, "switching model type");

        engine
            .switch_model_type(model_type)
            .await
            .map_err(UploadError::Engine)
    }

    pub async fn update_setting(
        &self,
        key: &str,
        value: &models::SettingValue,
    ) -> Result<models::ModelInfo> {
        if key.is_empty() {
            return Err(UploadError::invalid_request("setting key is empty"));
        }

        let mut engine = self.engine.write().await;

        tracing::debug!(key, value = ?value, "updating setting");

        engine
            .update_settings(key, value)
            .await
            .map_err(UploadError::Engine)
    }

    pub async fn info(&self) -> Result<models::ModelInfo> {
        let engine = self.engine.read().await;
        engine.info().await.map_err(UploadError::Engine)
    }

    pub async fn model_type(&self) -> Result<models::ModelTypeInfo> {
        let engine = self.engine.read().await;
        engine.model_type().await.map_err(UploadError::Engine)
    }

    /// Unpacks a training dataset archive. Existing files in `dest_dir` are overwritten and there is
    /// no rollback.
    pub async fn extract_archive(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        super::extract_archive(archive_path, dest_dir).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::{
        path::PathBuf,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[derive(Debug, Default)]
    struct FakeEngine {
        model_type: models::ModelType,
        loaded: Option<PathBuf>,
        fail_loads: bool,
        active_writers: Arc<AtomicUsize>,
        max_writers: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl crate::backends::inference_engine::InferenceEngineBackend for FakeEngine {
        async fn load_model(
            &mut self,
            selection: &models::ModelSelection,
        ) -> anyhow::Result<models::ModelInfo> {
            let active = self.active_writers.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_writers.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active_writers.fetch_sub(1, Ordering::SeqCst);

            if self.fail_loads {
                return Err(anyhow!("cannot read weights"));
            }

            self.loaded = Some(selection.config.clone());
            self.info().await
        }

        async fn info(&self) -> anyhow::Result<models::ModelInfo> {
            Ok(models::ModelInfo::new()
                .with("modelType", self.model_type.as_str())
                .with(
                    "configFile",
                    self.loaded.as_ref().map(|path| path.display().to_string()),
                ))
        }

        async fn update_settings(
            &mut self,
            key: &str,
            value: &models::SettingValue,
        ) -> anyhow::Result<models::ModelInfo> {
            Ok(self.info().await?.with(key, value.clone()))
        }

        async fn switch_model_type(
            &mut self,
            model_type: models::ModelType,
        ) -> anyhow::Result<models::ModelInfo> {
            self.model_type = model_type;
            self.info().await
        }

        async fn model_type(&self) -> anyhow::Result<models::ModelTypeInfo> {
            Ok(models::ModelTypeInfo::ok(self.model_type))
        }
    }

    fn selection(config: &str) -> models::ModelSelection {
        models::ModelSelection {
            config: PathBuf::from("upload_dir").join(config),
            pytorch_model: models::ArtifactSlot::Absent,
            onnx_model: models::ArtifactSlot::Present("upload_dir/model.onnx".into()),
            cluster_model: models::ArtifactSlot::Absent,
            feature: models::ArtifactSlot::Absent,
            index: models::ArtifactSlot::Absent,
            is_half: true,
        }
    }

    #[tokio::test]
    async fn test_load_model_relays_info() {
        let coordinator = ModelLoadCoordinator::new(Box::new(FakeEngine::default()));

        let info = coordinator.load_model(&selection("cfg.json")).await.unwrap();

        assert_eq!(
            info.get("configFile"),
            Some(&serde_json::json!("upload_dir/cfg.json"))
        );
    }

    #[tokio::test]
    async fn test_engine_failure_is_wrapped() {
        let coordinator = ModelLoadCoordinator::new(Box::new(FakeEngine {
            fail_loads: true,
            ..FakeEngine::default()
        }));

        let err = coordinator
            .load_model(&selection("cfg.json"))
            .await
            .unwrap_err();

        match err {
            UploadError::Engine(err) => assert_eq!(err.to_string(), "cannot read weights"),
            err => panic!("unexpected error: {:?}", err),
        }
    }

    #[tokio::test]
    async fn test_concurrent_loads_are_serialized() {
        let max_writers = Arc::new(AtomicUsize::new(0));
        let coordinator = Arc::new(ModelLoadCoordinator::new(Box::new(FakeEngine {
            max_writers: max_writers.clone(),
            ..FakeEngine::default()
        })));

        let loads = (0..8)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .load_model(&selection(&format!("cfg{}.json", i)))
                        .await
                })
            })
            .collect::<Vec<_>>();

        for load in loads {
            load.await.unwrap().unwrap();
        }

        assert_eq!(max_writers.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_switch_model_type() {
        let coordinator = ModelLoadCoordinator::new(Box::new(FakeEngine::default()));

        coordinator
            .switch_model_type(models::ModelType::Rvc)
            .await
            .unwrap();

        assert_eq!(
            coordinator.model_type().await.unwrap(),
            models::ModelTypeInfo::ok(models::ModelType::Rvc)
        );
    }

    #[tokio::test]
    async fn test_update_setting_rejects_empty_key() {
        let coordinator = ModelLoadCoordinator::new(Box::new(FakeEngine::default()));

        let err = coordinator
            .update_setting("", &models::SettingValue::Int(1))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidRequest(_)));

        let info = coordinator
            .update_setting("tran", &models::SettingValue::Int(12))
            .await
            .unwrap();
        assert_eq!(info.get("tran"), Some(&serde_json::json!(12)));
    }
}
