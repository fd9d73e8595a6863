use voxload_core::models::{ArtifactFields, ModelType, SettingValue};

use super::{ok, uploads::read_form, ApiError, State};

pub async fn info(state: &State) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let info = state.coordinator.info().await?;
    ok(&info)
}

pub async fn update_settings(
    mut req: hyper::Request<hyper::Body>,
    state: &State,
) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let form = read_form(&mut req, state).await?;
    let key = form.required("key")?;
    let value = SettingValue::parse(form.required("val")?);

    let info = state.coordinator.update_setting(key, &value).await?;
    ok(&info)
}

pub async fn load_model(
    mut req: hyper::Request<hyper::Body>,
    state: &State,
) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let form = read_form(&mut req, state).await?;

    let fields = ArtifactFields {
        pytorch_model: form.required("pyTorchModelFilename")?.to_owned(),
        onnx_model: form.required("onnxModelFilename")?.to_owned(),
        config: form.required("configFilename")?.to_owned(),
        cluster_model: form.required("clusterTorchModelFilename")?.to_owned(),
        feature: form.required("featureFilename")?.to_owned(),
        index: form.required("indexFilename")?.to_owned(),
        is_half: form.required_bool("isHalf")?,
    };

    let selection = state.resolver.resolve_paths(&fields)?;
    let info = state.coordinator.load_model(&selection).await?;
    ok(&info)
}

pub async fn switch_model_type(
    mut req: hyper::Request<hyper::Body>,
    state: &State,
) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let form = read_form(&mut req, state).await?;
    let model_type = form.required("modelType")?.parse::<ModelType>()?;

    let info = state.coordinator.switch_model_type(model_type).await?;
    ok(&info)
}

pub async fn model_type(state: &State) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let info = state.coordinator.model_type().await?;
    ok(&info)
}
