use anyhow::{Context, Result};
use futures::future;
use hyper::{
    server::conn::AddrStream,
    service::{make_service_fn, service_fn},
    Server,
};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use voxload_core::{
    backends::InferenceEngine,
    services::{ArtifactResolver, ChunkConcatenator, ChunkStore, FilenameLocks, ModelLoadCoordinator},
};

use crate::config::Settings;

pub use error::ApiError;

mod error;
mod forms;
mod models;
mod uploads;

/// Everything a request handler needs, shared by all connections.
#[derive(Debug)]
pub struct State {
    pub settings: Settings,
    pub store: ChunkStore,
    pub concatenator: ChunkConcatenator,
    pub resolver: ArtifactResolver,
    pub coordinator: ModelLoadCoordinator,
}

impl State {
    pub async fn open(settings: Settings, engine: InferenceEngine) -> Result<State> {
        settings.create_dirs().await?;

        let locks = FilenameLocks::new();
        let store = ChunkStore::open(&settings.upload_dir, locks.clone())
            .await
            .context("opening upload dir")?;

        Ok(State {
            store,
            concatenator: ChunkConcatenator::new(locks),
            resolver: ArtifactResolver::new(&settings.upload_dir),
            coordinator: ModelLoadCoordinator::new(engine),
            settings,
        })
    }
}

pub async fn serve(state: Arc<State>, addr: SocketAddr) -> Result<()> {
    let server = Server::try_bind(&addr)
        .with_context(|| format!("binding {}", addr))?
        .serve(make_service_fn(move |s: &AddrStream| {
            let remote_addr = s.remote_addr();
            let state = state.clone();

            future::ok::<_, Infallible>(service_fn(move |req: hyper::Request<hyper::Body>| {
                let path = req.uri().path_and_query().map(|p| p.as_str());

                tracing::info!(
                    remote_addr = %remote_addr,
                    version = ?req.version(),
                    method = %req.method(),
                    path = %path.unwrap_or("None"),
                );

                handle(req, state.clone())
            }))
        }));

    tracing::info!("server listening on {}", addr);

    server
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("listening for shutdown signal: {:?}", err);
            }
        })
        .await?;

    tracing::info!("server stopped");

    Ok(())
}

pub async fn handle(
    req: hyper::Request<hyper::Body>,
    state: Arc<State>,
) -> Result<hyper::Response<hyper::Body>> {
    let res = handle_inner(req, &state).await;
    match res {
        Ok(res) => Ok(res),
        Err(err) => {
            match err.status() {
                status if status.is_server_error() => tracing::error!("{:?}", err),
                _ => tracing::info!(error = %err, "request rejected"),
            }

            json(err.status(), &err.body())
        }
    }
}

async fn handle_inner(
    req: hyper::Request<hyper::Body>,
    state: &State,
) -> Result<hyper::Response<hyper::Body>, ApiError> {
    use http::Method;

    match (req.method(), req.uri().path()) {
        (&Method::GET, "/info") => models::info(state).await,
        (&Method::POST, "/upload_file") => uploads::upload_file(req, state).await,
        (&Method::GET, "/uploaded_chunks") => uploads::uploaded_chunks(req, state).await,
        (&Method::POST, "/concat_uploaded_file") => uploads::concat_uploaded_file(req, state).await,
        (&Method::POST, "/update_settings") => models::update_settings(req, state).await,
        (&Method::POST, "/load_model") => models::load_model(req, state).await,
        (&Method::POST, "/load_model_for_train") => uploads::load_model_for_train(req, state).await,
        (&Method::POST, "/extract_voices") => uploads::extract_voices(req, state).await,
        (&Method::POST, "/model_type") => models::switch_model_type(req, state).await,
        (&Method::GET, "/model_type") => models::model_type(state).await,
        (method, path) => Err(ApiError::NotFound {
            method: method.to_string(),
            path: path.to_owned(),
        }),
    }
}

fn json<T: serde::Serialize>(
    status: http::StatusCode,
    body: &T,
) -> Result<hyper::Response<hyper::Body>> {
    let body = serde_json::to_vec(body).context("serializing response")?;

    let res = hyper::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(hyper::Body::from(body))?;

    Ok(res)
}

fn ok<T: serde::Serialize>(body: &T) -> Result<hyper::Response<hyper::Body>, ApiError> {
    Ok(json(http::StatusCode::OK, body)?)
}
