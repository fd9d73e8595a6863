use std::path::{Path, PathBuf};

/// An optional artifact after sentinel translation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSlot {
    Present(PathBuf),
    Absent,
}

impl ArtifactSlot {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ArtifactSlot::Present(path) => Some(path),
            ArtifactSlot::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, ArtifactSlot::Present(_))
    }
}

/// Filenames as sent by the client. Optional artifacts use the sentinel `-` when they are not
/// provided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactFields {
    pub pytorch_model: String,
    pub onnx_model: String,
    pub config: String,
    pub cluster_model: String,
    pub feature: String,
    pub index: String,
    pub is_half: bool,
}

/// Everything the inference engine needs to load a model.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ModelSelection {
    pub config: PathBuf,
    pub pytorch_model: ArtifactSlot,
    pub onnx_model: ArtifactSlot,
    pub cluster_model: ArtifactSlot,
    pub feature: ArtifactSlot,
    pub index: ArtifactSlot,
    pub is_half: bool,
}

impl ModelSelection {
    /// Paths of every artifact that was provided, config first.
    pub fn present_paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.config.as_path()).chain(
            [
                &self.pytorch_model,
                &self.onnx_model,
                &self.cluster_model,
                &self.feature,
                &self.index,
            ]
            .into_iter()
            .filter_map(ArtifactSlot::path),
        )
    }
}
