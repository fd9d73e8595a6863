use std::{
    fmt,
    path::{Component, Path},
};

use crate::error::{Result, UploadError};

/// Placeholder sent by clients for artifacts that were not provided.
pub const SENTINEL: &str = "-";

/// Longest name most filesystems accept for a single path component.
const MAX_COMPONENT_LEN: usize = 255;

/// Leaves room for the longest fragment or temporary file derived from the name.
pub const MAX_FILENAME_LEN: usize = MAX_COMPONENT_LEN - super::MAX_NAME_OVERHEAD;

/// Client chosen name of a file that is uploaded in chunks.
///
/// A logical filename is always a single, normal path component. It can be joined onto the upload
/// directory without escaping it, and it never collides with the names used for fragments or
/// temporary files.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct LogicalFilename(String);

impl LogicalFilename {
    pub fn parse(name: impl Into<String>) -> Result<LogicalFilename> {
        let name = name.into();

        if name.is_empty() {
            return Err(UploadError::invalid_request("filename is empty"));
        }

        if name.len() > MAX_FILENAME_LEN {
            return Err(UploadError::invalid_request(format!(
                "filename is longer than {} bytes",
                MAX_FILENAME_LEN
            )));
        }

        if name == SENTINEL {
            return Err(UploadError::invalid_request(format!(
                "{:?} is reserved for artifacts that are not provided",
                SENTINEL
            )));
        }

        if name.contains(|c: char| c == '/' || c == '\\' || c == '\0') {
            return Err(UploadError::invalid_request(format!(
                "filename {:?} contains a path separator",
                name
            )));
        }

        // Dot files are reserved for temporary files.
        if name.starts_with('.') {
            return Err(UploadError::invalid_request(format!(
                "filename {:?} starts with a period",
                name
            )));
        }

        let mut components = Path::new(&name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => (),
            _ => {
                return Err(UploadError::invalid_request(format!(
                    "filename {:?} is not a plain file name",
                    name
                )))
            }
        }

        if super::parse_fragment_file_name(&name).is_some() {
            return Err(UploadError::invalid_request(format!(
                "filename {:?} clashes with the fragment naming scheme",
                name
            )));
        }

        Ok(LogicalFilename(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for LogicalFilename {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}
