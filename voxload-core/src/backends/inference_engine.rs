use anyhow::Result;
use std::fmt::Debug;

use crate::models;

pub type InferenceEngine = Box<dyn InferenceEngineBackend>;

/// The voice conversion engine that owns the currently loaded model.
///
/// Operations that change the loaded model take `&mut self`. The coordinator keeps the engine
/// behind a lock, so a load or switch never overlaps with another one or with a read.
#[async_trait::async_trait]
pub trait InferenceEngineBackend: Debug + Send + Sync {
    async fn load_model(&mut self, selection: &models::ModelSelection)
        -> Result<models::ModelInfo>;

    async fn info(&self) -> Result<models::ModelInfo>;

    async fn update_settings(
        &mut self,
        key: &str,
        value: &models::SettingValue,
    ) -> Result<models::ModelInfo>;

    async fn switch_model_type(
        &mut self,
        model_type: models::ModelType,
    ) -> Result<models::ModelInfo>;

    async fn model_type(&self) -> Result<models::ModelTypeInfo>;
}
