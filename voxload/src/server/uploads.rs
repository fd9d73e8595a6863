use serde_json::json;
use std::path::Path;
use voxload_core::{models::LogicalFilename, services::archive_format};

use super::{
    forms::{read_body, Form},
    ok, ApiError, State,
};

/// `POST /upload_file?filename=F[&index=N]` with the raw chunk as the body.
///
/// Without an index the body is the whole file and is moved into place right away. Fragments
/// already stored under the same name are not touched.
pub async fn upload_file(
    mut req: hyper::Request<hyper::Body>,
    state: &State,
) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let query = Form::from_query(&req);
    let filename = LogicalFilename::parse(query.required("filename")?)?;
    let index = query.optional_u32("index")?;

    let payload = read_body(&mut req, state.settings.max_chunk_bytes).await?;

    match index {
        Some(index) => {
            let chunk = state.store.store_chunk(&filename, index, &payload).await?;

            ok(&json!({
                "status": "OK",
                "filename": chunk.filename,
                "index": chunk.index,
                "size": chunk.size,
            }))
        }
        None => {
            let path = state.store.store_file(&filename, &payload).await?;

            ok(&json!({
                "status": "OK",
                "filename": filename,
                "path": path,
                "size": payload.len(),
            }))
        }
    }
}

/// `GET /uploaded_chunks?filename=F`
pub async fn uploaded_chunks(
    req: hyper::Request<hyper::Body>,
    state: &State,
) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let query = Form::from_query(&req);
    let filename = LogicalFilename::parse(query.required("filename")?)?;

    let chunks = state.store.stored_chunks(&filename).await?;

    ok(&json!({
        "status": "OK",
        "filename": filename,
        "chunks": chunks,
    }))
}

pub async fn concat_uploaded_file(
    mut req: hyper::Request<hyper::Body>,
    state: &State,
) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let form = read_form(&mut req, state).await?;
    let filename = LogicalFilename::parse(form.required("filename")?)?;
    let chunks = form.required_u32("filenameChunkNum")?;

    let upload_dir = state.store.directory();
    let path = state
        .concatenator
        .concatenate(upload_dir, &filename, chunks, upload_dir)
        .await?;

    ok(&json!({
        "status": "OK",
        "filename": filename,
        "path": path,
    }))
}

/// Reassembles a generator and a discriminator checkpoint into the training model directory.
pub async fn load_model_for_train(
    mut req: hyper::Request<hyper::Body>,
    state: &State,
) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let form = read_form(&mut req, state).await?;
    let generator = LogicalFilename::parse(form.required("modelGFilename")?)?;
    let generator_chunks = form.required_u32("modelGFilenameChunkNum")?;
    let discriminator = LogicalFilename::parse(form.required("modelDFilename")?)?;
    let discriminator_chunks = form.required_u32("modelDFilenameChunkNum")?;

    let upload_dir = state.store.directory();
    let model_dir = &state.settings.model_dir;

    // Both must be complete before either is consumed.
    state
        .concatenator
        .check_complete(upload_dir, &generator, generator_chunks)
        .await?;
    state
        .concatenator
        .check_complete(upload_dir, &discriminator, discriminator_chunks)
        .await?;

    let generator_path = state
        .concatenator
        .concatenate(upload_dir, &generator, generator_chunks, model_dir)
        .await?;
    let discriminator_path = state
        .concatenator
        .concatenate(upload_dir, &discriminator, discriminator_chunks, model_dir)
        .await?;

    ok(&json!({
        "status": "OK",
        "modelG": generator_path,
        "modelD": discriminator_path,
    }))
}

/// Reassembles a dataset archive and unpacks it into the dataset directory.
pub async fn extract_voices(
    mut req: hyper::Request<hyper::Body>,
    state: &State,
) -> Result<hyper::Response<hyper::Body>, ApiError> {
    let form = read_form(&mut req, state).await?;
    let archive = LogicalFilename::parse(form.required("zipFilename")?)?;
    let chunks = form.required_u32("zipFileChunkNum")?;

    archive_format(Path::new(archive.as_str()))?;

    let upload_dir = state.store.directory();
    let archive_path = state
        .concatenator
        .concatenate(upload_dir, &archive, chunks, upload_dir)
        .await?;

    state
        .coordinator
        .extract_archive(&archive_path, &state.settings.dataset_dir)
        .await?;

    ok(&json!({
        "status": "OK",
        "archive": archive_path,
        "destination": state.settings.dataset_dir,
    }))
}

pub(super) async fn read_form(
    req: &mut hyper::Request<hyper::Body>,
    state: &State,
) -> Result<Form, ApiError> {
    let body = read_body(req, state.settings.max_chunk_bytes).await?;
    Ok(Form::parse(&body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backends::MemoryEngine, config::Settings};
    use flate2::{write::GzEncoder, Compression};
    use tempfile::TempDir;

    async fn state(dir: &TempDir) -> State {
        let settings = Settings {
            upload_dir: dir.path().join("upload_dir"),
            model_dir: dir.path().join("logs"),
            dataset_dir: dir.path().join("textful"),
            ..Settings::default()
        };

        State::open(settings, Box::new(MemoryEngine::new()))
            .await
            .unwrap()
    }

    fn extract_request(body: &'static str) -> hyper::Request<hyper::Body> {
        hyper::Request::post("/extract_voices")
            .body(hyper::Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_extract_voices() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;

        let mut archive = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        archive
            .append_data(&mut header, "00_myvoice/wav/emotion001.wav", &b"RIFF"[..])
            .unwrap();
        let archive = archive.into_inner().unwrap().finish().unwrap();

        let (first, second) = archive.split_at(archive.len() / 2);
        let name = LogicalFilename::parse("voices.tar.gz").unwrap();
        state.store.store_chunk(&name, 0, first).await.unwrap();
        state.store.store_chunk(&name, 1, second).await.unwrap();

        let res = extract_voices(
            extract_request("zipFilename=voices.tar.gz&zipFileChunkNum=2"),
            &state,
        )
        .await
        .unwrap();

        assert_eq!(res.status(), http::StatusCode::OK);
        assert_eq!(
            std::fs::read(dir.path().join("textful/00_myvoice/wav/emotion001.wav")).unwrap(),
            b"RIFF"
        );
    }

    #[tokio::test]
    async fn test_extract_voices_unknown_format_keeps_chunks() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;

        let name = LogicalFilename::parse("voices.rar").unwrap();
        state.store.store_chunk(&name, 0, b"Rar!").await.unwrap();

        let err = extract_voices(
            extract_request("zipFilename=voices.rar&zipFileChunkNum=1"),
            &state,
        )
        .await
        .unwrap_err();

        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
        assert_eq!(state.store.stored_chunks(&name).await.unwrap(), vec![0]);
        assert!(!dir.path().join("upload_dir/voices.rar").exists());
    }
}
