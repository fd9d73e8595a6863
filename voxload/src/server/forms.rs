use hyper::body::{Bytes, HttpBody};
use std::collections::HashMap;

use super::ApiError;

/// Reads the whole request body, failing as soon as more than `limit` bytes have arrived.
pub async fn read_body(req: &mut hyper::Request<hyper::Body>, limit: u64) -> Result<Bytes, ApiError> {
    let declared = req
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|len| len.to_str().ok())
        .and_then(|len| len.parse::<u64>().ok());

    if matches!(declared, Some(len) if len > limit) {
        return Err(ApiError::PayloadTooLarge { limit });
    }

    let body = req.body_mut();
    let mut buffer = Vec::with_capacity(declared.unwrap_or(0) as usize);

    while let Some(data) = body.data().await {
        let data = data.map_err(|err| anyhow::Error::new(err).context("reading request body"))?;

        if (buffer.len() + data.len()) as u64 > limit {
            return Err(ApiError::PayloadTooLarge { limit });
        }

        buffer.extend_from_slice(&data);
    }

    Ok(Bytes::from(buffer))
}

/// Fields of a query string or an `application/x-www-form-urlencoded` body.
#[derive(Clone, Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
}

impl Form {
    pub fn parse(input: &[u8]) -> Form {
        let fields = url::form_urlencoded::parse(input).into_owned().collect();
        Form { fields }
    }

    pub fn from_query(req: &hyper::Request<hyper::Body>) -> Form {
        Form::parse(req.uri().query().unwrap_or("").as_bytes())
    }

    pub fn optional(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn required(&self, name: &str) -> Result<&str, ApiError> {
        self.optional(name)
            .ok_or_else(|| ApiError::bad_request(format!("missing field {}", name)))
    }

    pub fn required_u32(&self, name: &str) -> Result<u32, ApiError> {
        let value = self.required(name)?;
        value
            .trim()
            .parse()
            .map_err(|_| ApiError::bad_request(format!("{} is not a chunk count: {}", name, value)))
    }

    pub fn optional_u32(&self, name: &str) -> Result<Option<u32>, ApiError> {
        match self.optional(name) {
            Some(_) => self.required_u32(name).map(Some),
            None => Ok(None),
        }
    }

    pub fn required_bool(&self, name: &str) -> Result<bool, ApiError> {
        let value = self.required(name)?;
        parse_bool(value)
            .ok_or_else(|| ApiError::bad_request(format!("{} is not a boolean: {}", name, value)))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_fields() {
        let form = Form::parse(b"filename=G_latest.pth&filenameChunkNum=12&isHalf=true&key=a%20b");

        assert_eq!(form.required("filename").unwrap(), "G_latest.pth");
        assert_eq!(form.required_u32("filenameChunkNum").unwrap(), 12);
        assert!(form.required_bool("isHalf").unwrap());
        assert_eq!(form.optional("key"), Some("a b"));
        assert_eq!(form.optional_u32("index").unwrap(), None);
    }

    #[test]
    fn test_form_errors() {
        let form = Form::parse(b"filenameChunkNum=-1&isHalf=maybe");

        assert!(matches!(form.required("filename"), Err(ApiError::BadRequest(_))));
        assert!(matches!(form.required_u32("filenameChunkNum"), Err(ApiError::BadRequest(_))));
        assert!(matches!(form.required_bool("isHalf"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool(""), None);
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let mut req = hyper::Request::new(hyper::Body::from(vec![0u8; 16]));
        assert_eq!(read_body(&mut req, 16).await.unwrap().len(), 16);

        let mut req = hyper::Request::new(hyper::Body::from(vec![0u8; 17]));
        assert!(matches!(
            read_body(&mut req, 16).await,
            Err(ApiError::PayloadTooLarge { limit: 16 })
        ));
    }
}
