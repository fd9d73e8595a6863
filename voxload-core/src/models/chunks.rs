use std::path::PathBuf;

use super::LogicalFilename;

/// Zero-based position of a chunk within its logical file.
pub type ChunkIndex = u32;

const FRAGMENT_MARKER: &str = ".part";
const TEMP_SUFFIX: &str = ".tmp";
const MAX_INDEX_DIGITS: usize = 10;
const UUID_LEN: usize = 36;

/// Most bytes the fragment and temporary file names add on top of a logical filename.
pub const MAX_NAME_OVERHEAD: usize =
    FRAGMENT_MARKER.len() + MAX_INDEX_DIGITS + 2 + UUID_LEN + TEMP_SUFFIX.len();

/// Name of the fragment holding chunk `index` of `filename`: `{filename}.part{index}`.
pub fn fragment_file_name(filename: &LogicalFilename, index: ChunkIndex) -> String {
    format!("{}{}{}", filename, FRAGMENT_MARKER, index)
}

/// Splits a fragment file name back into its logical filename and chunk index.
///
/// Indices are written without leading zeros, so anything else is not a fragment. This keeps the
/// mapping between names and indices one to one.
pub fn parse_fragment_file_name(file_name: &str) -> Option<(&str, ChunkIndex)> {
    let (filename, index) = file_name.rsplit_once(FRAGMENT_MARKER)?;

    if filename.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if index.len() > 1 && index.starts_with('0') {
        return None;
    }

    let index = index.parse().ok()?;

    Some((filename, index))
}

/// Name of a temporary file that is renamed to `target` once it is completely written.
pub fn temp_file_name(target: &str) -> String {
    format!(".{}.{}{}", target, uuid::Uuid::new_v4(), TEMP_SUFFIX)
}

/// Recovers the target name from a temporary file name.
pub fn parse_temp_file_name(file_name: &str) -> Option<&str> {
    let inner = file_name
        .strip_prefix('.')?
        .strip_suffix(TEMP_SUFFIX)?;
    let (target, id) = inner.rsplit_once('.')?;

    uuid::Uuid::parse_str(id).ok()?;

    Some(target)
}

/// A chunk that has been written to the staging directory.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StoredChunkRef {
    pub filename: LogicalFilename,
    pub index: ChunkIndex,
    pub path: PathBuf,
    pub size: u64,
}
