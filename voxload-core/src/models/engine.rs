use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

use crate::error::UploadError;

/// Voice conversion model families the engine can switch between.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelType {
    #[serde(rename = "MMVCv15")]
    MmvcV15,
    #[serde(rename = "MMVCv13")]
    MmvcV13,
    #[serde(rename = "so-vits-svc-40")]
    SoVitsSvc40,
    #[serde(rename = "so-vits-svc-40v2")]
    SoVitsSvc40V2,
    #[serde(rename = "DDSP-SVC")]
    DdspSvc,
    #[serde(rename = "RVC")]
    Rvc,
}

impl ModelType {
    pub const ALL: [ModelType; 6] = [
        ModelType::MmvcV15,
        ModelType::MmvcV13,
        ModelType::SoVitsSvc40,
        ModelType::SoVitsSvc40V2,
        ModelType::DdspSvc,
        ModelType::Rvc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::MmvcV15 => "MMVCv15",
            ModelType::MmvcV13 => "MMVCv13",
            ModelType::SoVitsSvc40 => "so-vits-svc-40",
            ModelType::SoVitsSvc40V2 => "so-vits-svc-40v2",
            ModelType::DdspSvc => "DDSP-SVC",
            ModelType::Rvc => "RVC",
        }
    }
}

impl Default for ModelType {
    fn default() -> ModelType {
        ModelType::MmvcV15
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<ModelType, UploadError> {
        ModelType::ALL
            .into_iter()
            .find(|model_type| model_type.as_str() == s)
            .ok_or_else(|| UploadError::invalid_request(format!("unknown model type {:?}", s)))
    }
}

/// Reply to a model type query.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelTypeInfo {
    pub status: String,
    #[serde(rename = "vc")]
    pub model_type: ModelType,
}

impl ModelTypeInfo {
    pub fn ok(model_type: ModelType) -> ModelTypeInfo {
        ModelTypeInfo {
            status: "OK".into(),
            model_type,
        }
    }
}

/// State report returned by the inference engine. The shape is engine defined, the services only
/// relay it.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ModelInfo(Map<String, Value>);

impl ModelInfo {
    pub fn new() -> ModelInfo {
        ModelInfo::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> ModelInfo {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl From<Map<String, Value>> for ModelInfo {
    fn from(map: Map<String, Value>) -> ModelInfo {
        ModelInfo(map)
    }
}

/// Value of an engine setting. Form values are untyped, so the narrowest type that parses wins.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    pub fn parse(value: &str) -> SettingValue {
        if let Ok(value) = value.parse() {
            SettingValue::Int(value)
        } else if let Some(value) = value.parse().ok().filter(|value: &f64| value.is_finite()) {
            SettingValue::Float(value)
        } else {
            SettingValue::Text(value.to_owned())
        }
    }
}

impl From<SettingValue> for Value {
    fn from(value: SettingValue) -> Value {
        match value {
            SettingValue::Int(value) => value.into(),
            SettingValue::Float(value) => value.into(),
            SettingValue::Text(value) => value.into(),
        }
    }
}
