use http::StatusCode;
use thiserror::Error;
use voxload_core::UploadError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("no route for {method} {path}")]
    NotFound { method: String, path: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> ApiError {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Upload(UploadError::InvalidRequest(_)) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Upload(UploadError::IncompleteUpload { .. }) => StatusCode::CONFLICT,
            ApiError::Upload(UploadError::Storage { .. }) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Upload(UploadError::Engine(_)) => StatusCode::BAD_GATEWAY,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Upload(err) => err.kind(),
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::NotFound { .. } => "not_found",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "status": "NG",
            "error": self.kind(),
            "message": self.to_string(),
        });

        if let ApiError::Upload(UploadError::IncompleteUpload { filename, index }) = self {
            body["filename"] = filename.as_str().into();
            body["missingIndex"] = (*index).into();
        }

        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(UploadError::invalid_request("empty filename")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(UploadError::IncompleteUpload {
                    filename: "model.bin".into(),
                    index: 2,
                }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(UploadError::storage(
                    "upload_dir",
                    io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                )),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(UploadError::Engine(anyhow::anyhow!("bad weights"))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::PayloadTooLarge { limit: 10 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{:?}", err);
        }
    }

    #[test]
    fn test_incomplete_upload_body() {
        let err = ApiError::from(UploadError::IncompleteUpload {
            filename: "model.bin".into(),
            index: 1,
        });

        let body = err.body();

        assert_eq!(body["error"], "incomplete_upload");
        assert_eq!(body["filename"], "model.bin");
        assert_eq!(body["missingIndex"], 1);
    }
}
