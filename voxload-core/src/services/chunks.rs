use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::{fs, io::AsyncWriteExt};

use super::FilenameLocks;
use crate::{
    error::{Result, UploadError},
    models,
};

/// Writes uploaded chunks into the staging directory.
#[derive(Clone, Debug)]
pub struct ChunkStore {
    directory: PathBuf,
    locks: FilenameLocks,
}

impl ChunkStore {
    pub async fn open(directory: impl Into<PathBuf>, locks: FilenameLocks) -> Result<ChunkStore> {
        let directory = directory.into();

        fs::create_dir_all(&directory)
            .await
            .map_err(|err| UploadError::storage(&directory, err))?;

        Ok(ChunkStore { directory, locks })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Stores one chunk, replacing any earlier upload of the same index.
    pub async fn store_chunk(
        &self,
        filename: &models::LogicalFilename,
        index: models::ChunkIndex,
        payload: &[u8],
    ) -> Result<models::StoredChunkRef> {
        let _guard = self.locks.lock(filename).await;

        let path = self
            .replace_file(&models::fragment_file_name(filename, index), payload)
            .await?;

        tracing::debug!(
            filename = %filename,
            index,
            bytes = payload.len(),
            "stored chunk"
        );

        Ok(models::StoredChunkRef {
            filename: filename.clone(),
            index,
            path,
            size: payload.len() as u64,
        })
    }

    /// Stores a whole file in one step as `directory/filename`.
    ///
    /// Fragments of the same name are left alone, so a chunked upload in progress is not
    /// disturbed.
    pub async fn store_file(
        &self,
        filename: &models::LogicalFilename,
        payload: &[u8],
    ) -> Result<PathBuf> {
        let _guard = self.locks.lock(filename).await;

        let path = self.replace_file(filename.as_str(), payload).await?;

        tracing::info!(
            filename = %filename,
            bytes = payload.len(),
            path = %path.display(),
            "stored file"
        );

        Ok(path)
    }

    /// Writes `payload` to a temporary file and renames it over `directory/file_name`.
    async fn replace_file(&self, file_name: &str, payload: &[u8]) -> Result<PathBuf> {
        let path = self.directory.join(file_name);
        let temp_path = self.directory.join(models::temp_file_name(file_name));

        let result = async {
            fs::write(&temp_path, payload)
                .await
                .map_err(|err| UploadError::storage(&temp_path, err))?;
            fs::rename(&temp_path, &path)
                .await
                .map_err(|err| UploadError::storage(&path, err))
        }
        .await;

        match result {
            Ok(()) => Ok(path),
            Err(err) => {
                remove_temp_file(&temp_path).await;
                Err(err)
            }
        }
    }

    /// Indices of the fragments currently stored for `filename`, in ascending order.
    pub async fn stored_chunks(
        &self,
        filename: &models::LogicalFilename,
    ) -> Result<Vec<models::ChunkIndex>> {
        let _guard = self.locks.lock(filename).await;

        let mut indices = Vec::new();
        let mut entries = fs::read_dir(&self.directory)
            .await
            .map_err(|err| UploadError::storage(&self.directory, err))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| UploadError::storage(&self.directory, err))?
        {
            let file_name = entry.file_name();
            let file_name = match file_name.to_str() {
                Some(file_name) => file_name,
                None => continue,
            };

            match models::parse_fragment_file_name(file_name) {
                Some((name, index)) if name == filename.as_str() => indices.push(index),
                _ => (),
            }
        }

        indices.sort_unstable();

        Ok(indices)
    }

    /// Removes fragments and temporary files last modified more than `ttl` ago. Filenames with a
    /// request in flight are skipped.
    pub async fn sweep_orphans(&self, ttl: Duration) -> Result<SweepReport> {
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        let mut entries = fs::read_dir(&self.directory)
            .await
            .map_err(|err| UploadError::storage(&self.directory, err))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| UploadError::storage(&self.directory, err))?
        {
            let file_name = entry.file_name();
            let file_name = match file_name.to_str() {
                Some(file_name) => file_name,
                None => continue,
            };

            let filename = match staged_logical_filename(file_name) {
                Some(filename) => filename,
                None => continue,
            };

            // Held until the file is gone so a concurrent upload cannot replace it in between.
            let _guard = match self.locks.try_lock(&filename) {
                Some(guard) => guard,
                None => continue,
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(UploadError::storage(entry.path(), err)),
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            if age <= ttl {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => {
                    tracing::info!(
                        file = %file_name,
                        age_secs = age.as_secs(),
                        "removed orphaned upload file"
                    );
                    report.removed_files += 1;
                    report.removed_bytes += metadata.len();
                }
                Err(err) if err.kind() == ErrorKind::NotFound => (),
                Err(err) => return Err(UploadError::storage(entry.path(), err)),
            }
        }

        Ok(report)
    }
}

/// Outcome of an orphan sweep.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub removed_files: usize,
    pub removed_bytes: u64,
}

/// The logical filename a fragment or temporary file in the staging directory belongs to.
fn staged_logical_filename(file_name: &str) -> Option<models::LogicalFilename> {
    let name = match models::parse_temp_file_name(file_name) {
        Some(target) => models::parse_fragment_file_name(target)
            .map(|(name, _)| name)
            .unwrap_or(target),
        None => models::parse_fragment_file_name(file_name)?.0,
    };

    models::LogicalFilename::parse(name).ok()
}

/// Merges stored fragments into finished files.
#[derive(Clone, Debug)]
pub struct ChunkConcatenator {
    locks: FilenameLocks,
}

impl ChunkConcatenator {
    pub fn new(locks: FilenameLocks) -> ChunkConcatenator {
        ChunkConcatenator { locks }
    }

    /// Fails with `IncompleteUpload` unless fragments `0..expected_chunks` of `filename` are all
    /// in `source_dir`. Nothing is read or changed.
    ///
    /// Lets a caller that merges several uploads in one request refuse before any of them is
    /// consumed.
    pub async fn check_complete(
        &self,
        source_dir: &Path,
        filename: &models::LogicalFilename,
        expected_chunks: u32,
    ) -> Result<()> {
        check_chunk_count(filename, expected_chunks)?;

        let _guard = self.locks.lock(filename).await;
        present_fragments(source_dir, filename, expected_chunks).await?;

        Ok(())
    }

    /// Appends fragments `0..expected_chunks` of `filename` from `source_dir`, in index order, to
    /// `dest_dir/filename` and deletes the fragments.
    ///
    /// Nothing is written unless every fragment is present, and the output only appears under its
    /// final name once it is complete. On failure the fragments are left as they were.
    pub async fn concatenate(
        &self,
        source_dir: &Path,
        filename: &models::LogicalFilename,
        expected_chunks: u32,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        check_chunk_count(filename, expected_chunks)?;

        let _guard = self.locks.lock(filename).await;

        let fragments = present_fragments(source_dir, filename, expected_chunks).await?;

        fs::create_dir_all(dest_dir)
            .await
            .map_err(|err| UploadError::storage(dest_dir, err))?;

        let path = dest_dir.join(filename.as_str());
        let temp_path = dest_dir.join(models::temp_file_name(filename.as_str()));

        let result = async {
            let bytes = write_fragments(&temp_path, &fragments).await?;
            fs::rename(&temp_path, &path)
                .await
                .map_err(|err| UploadError::storage(&path, err))?;
            Ok::<_, UploadError>(bytes)
        }
        .await;

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(err) => {
                remove_temp_file(&temp_path).await;
                return Err(err);
            }
        };

        for fragment in &fragments {
            if let Err(err) = fs::remove_file(fragment).await {
                // The output is complete at this point, a leftover fragment is picked up by the
                // orphan sweep.
                tracing::warn!(
                    fragment = %fragment.display(),
                    "failed to remove fragment: {:?}",
                    err
                );
            }
        }

        tracing::info!(
            filename = %filename,
            chunks = expected_chunks,
            bytes,
            path = %path.display(),
            "concatenated upload"
        );

        Ok(path)
    }
}

fn check_chunk_count(filename: &models::LogicalFilename, expected_chunks: u32) -> Result<()> {
    if expected_chunks == 0 {
        return Err(UploadError::invalid_request(format!(
            "{} cannot be assembled from zero chunks",
            filename
        )));
    }

    Ok(())
}

/// Paths of fragments `0..expected_chunks`, or the first index that is missing.
async fn present_fragments(
    source_dir: &Path,
    filename: &models::LogicalFilename,
    expected_chunks: u32,
) -> Result<Vec<PathBuf>> {
    let mut fragments = Vec::with_capacity(expected_chunks as usize);

    for index in 0..expected_chunks {
        let fragment = source_dir.join(models::fragment_file_name(filename, index));

        let missing = || UploadError::IncompleteUpload {
            filename: filename.to_string(),
            index,
        };

        match fs::metadata(&fragment).await {
            Ok(metadata) if metadata.is_file() => fragments.push(fragment),
            Ok(_) => return Err(missing()),
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(missing()),
            Err(err) => return Err(UploadError::storage(fragment, err)),
        }
    }

    Ok(fragments)
}

async fn write_fragments(temp_path: &Path, fragments: &[PathBuf]) -> Result<u64> {
    let mut output = fs::File::create(temp_path)
        .await
        .map_err(|err| UploadError::storage(temp_path, err))?;

    let mut bytes = 0;

    for fragment in fragments {
        let mut input = fs::File::open(fragment)
            .await
            .map_err(|err| UploadError::storage(fragment, err))?;

        bytes += tokio::io::copy(&mut input, &mut output)
            .await
            .map_err(|err| UploadError::storage(temp_path, err))?;
    }

    output
        .flush()
        .await
        .map_err(|err| UploadError::storage(temp_path, err))?;
    output
        .sync_all()
        .await
        .map_err(|err| UploadError::storage(temp_path, err))?;

    Ok(bytes)
}

async fn remove_temp_file(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => (),
        Err(err) if err.kind() == ErrorKind::NotFound => (),
        Err(err) => tracing::warn!(
            path = %path.display(),
            "failed to remove temporary file: {:?}",
            err
        ),
    }
}
