use flate2::read::GzDecoder;
use std::{
    fs::File,
    io::{self, Read},
    path::{Component, Path, PathBuf},
};
use tar::{Archive, EntryType};
use zip::{result::ZipError, ZipArchive};

use crate::error::{Result, UploadError};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Archive formats that can be unpacked into the dataset directory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Zip,
}

impl ArchiveFormat {
    fn detect(path: &Path) -> Option<ArchiveFormat> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }

    fn open_tar(self, path: &Path) -> Result<Archive<Box<dyn Read>>> {
        let file = File::open(path).map_err(|err| UploadError::storage(path, err))?;

        let reader: Box<dyn Read> = match self {
            ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
            ArchiveFormat::Tar | ArchiveFormat::Zip => Box::new(file),
        };

        Ok(Archive::new(reader))
    }
}

/// The format of `path`, judged by its extension.
///
/// Fails with `InvalidRequest` for anything but `.zip`, `.tar`, `.tar.gz` and `.tgz`.
pub fn archive_format(path: &Path) -> Result<ArchiveFormat> {
    ArchiveFormat::detect(path).ok_or_else(|| {
        UploadError::invalid_request(format!(
            "{} is not a supported archive, expected .zip, .tar, .tar.gz or .tgz",
            path.display()
        ))
    })
}

/// Unpacks `archive_path` into `dest_dir`, overwriting files that already exist there.
///
/// The archive is scanned completely before anything is written, so an archive with an unsafe
/// entry leaves the destination untouched. Returns the number of entries unpacked.
pub async fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let format = archive_format(archive_path)?;

    let archive_path = archive_path.to_owned();
    let dest_dir = dest_dir.to_owned();

    let task_path = archive_path.clone();
    let result = tokio::task::spawn_blocking(move || match format {
        ArchiveFormat::Zip => extract_zip(&task_path, &dest_dir),
        ArchiveFormat::Tar | ArchiveFormat::TarGz => extract_tar(format, &task_path, &dest_dir),
    })
    .await;

    let entries = match result {
        Ok(result) => result?,
        Err(err) => {
            let err = io::Error::new(io::ErrorKind::Other, err);
            return Err(UploadError::storage(archive_path, err));
        }
    };

    tracing::info!(archive = %archive_path.display(), entries, "extracted archive");

    Ok(entries)
}

fn extract_tar(format: ArchiveFormat, archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let entries = validate_entries(format.open_tar(archive_path)?, archive_path)?;

    std::fs::create_dir_all(dest_dir).map_err(|err| UploadError::storage(dest_dir, err))?;

    format
        .open_tar(archive_path)?
        .unpack(dest_dir)
        .map_err(|err| UploadError::storage(dest_dir, err))?;

    Ok(entries)
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file = File::open(archive_path).map_err(|err| UploadError::storage(archive_path, err))?;
    let mut archive = ZipArchive::new(file).map_err(|err| zip_error(archive_path, err))?;

    let mut entries: Vec<(PathBuf, bool)> = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|err| zip_error(archive_path, err))?;

        let path = match entry.enclosed_name() {
            Some(path) if is_contained(path) => path.to_owned(),
            _ => {
                return Err(UploadError::invalid_request(format!(
                    "archive entry {} escapes the destination directory",
                    entry.name()
                )))
            }
        };

        if entry.unix_mode().map_or(false, |mode| mode & S_IFMT == S_IFLNK) {
            return Err(UploadError::invalid_request(format!(
                "archive entry {} is a link",
                path.display()
            )));
        }

        entries.push((path, entry.is_dir()));
    }

    std::fs::create_dir_all(dest_dir).map_err(|err| UploadError::storage(dest_dir, err))?;

    for (index, (path, is_dir)) in entries.iter().enumerate() {
        let target = dest_dir.join(path);

        if *is_dir {
            std::fs::create_dir_all(&target).map_err(|err| UploadError::storage(&target, err))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|err| UploadError::storage(parent, err))?;
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|err| zip_error(archive_path, err))?;
        let mut output = File::create(&target).map_err(|err| UploadError::storage(&target, err))?;

        io::copy(&mut entry, &mut output).map_err(|err| UploadError::storage(&target, err))?;
    }

    Ok(entries.len())
}

fn zip_error(archive_path: &Path, err: ZipError) -> UploadError {
    match err {
        ZipError::Io(err) => UploadError::storage(archive_path, err),
        err => UploadError::invalid_request(format!(
            "{} is not a valid zip archive: {}",
            archive_path.display(),
            err
        )),
    }
}

fn validate_entries(mut archive: Archive<Box<dyn Read>>, archive_path: &Path) -> Result<usize> {
    let mut count = 0;

    let entries = archive
        .entries()
        .map_err(|err| UploadError::storage(archive_path, err))?;

    for entry in entries {
        let entry = entry.map_err(|err| UploadError::storage(archive_path, err))?;
        let path = entry
            .path()
            .map_err(|err| UploadError::storage(archive_path, err))?
            .into_owned();

        if !is_contained(&path) {
            return Err(UploadError::invalid_request(format!(
                "archive entry {} escapes the destination directory",
                path.display()
            )));
        }

        match entry.header().entry_type() {
            EntryType::Symlink | EntryType::Link => {
                return Err(UploadError::invalid_request(format!(
                    "archive entry {} is a link",
                    path.display()
                )))
            }
            _ => (),
        }

        count += 1;
    }

    Ok(count)
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;
    use tempfile::TempDir;
    use zip::{write::FileOptions, CompressionMethod};

    fn append(builder: &mut tar::Builder<impl io::Write>, name: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);

        // Written directly so names the builder would refuse can be tested.
        let raw_name = &mut header.as_old_mut().name;
        raw_name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_cksum();

        builder.append(&header, data).unwrap();
    }

    fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in files {
            append(&mut builder, name, data);
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn test_extract_tar_gz() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("voices.tar.gz");
        let dest = dir.path().join("dataset").join("textful");

        write_tar_gz(
            &archive,
            &[
                ("00_myvoice/wav/emotion001.wav", b"RIFF"),
                ("00_myvoice/text/emotion001.txt", b"hello"),
            ],
        );

        let entries = extract_archive(&archive, &dest).await.unwrap();

        assert_eq!(entries, 2);
        assert_eq!(
            std::fs::read(dest.join("00_myvoice/text/emotion001.txt")).unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn test_extract_overwrites_existing_files() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("voices.tgz");
        let dest = dir.path().join("dataset");

        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("a.txt"), b"old").unwrap();
        write_tar_gz(&archive, &[("a.txt", b"new")]);

        extract_archive(&archive, &dest).await.unwrap();

        assert_eq!(std::fs::read(dest.join("a.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_extract_rejects_parent_dir_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("voices.tar.gz");
        let dest = dir.path().join("dataset");

        write_tar_gz(&archive, &[("ok.txt", b"ok"), ("../evil.txt", b"evil")]);

        let err = extract_archive(&archive, &dest).await.unwrap_err();

        assert!(matches!(err, UploadError::InvalidRequest(_)));
        assert!(!dest.join("ok.txt").exists());
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[tokio::test]
    async fn test_extract_rejects_unknown_format() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("voices.rar");
        std::fs::write(&archive, b"Rar!").unwrap();

        let err = extract_archive(&archive, dir.path()).await.unwrap_err();

        assert!(matches!(err, UploadError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_extract_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("voices.zip");
        let dest = dir.path().join("dataset").join("textful");

        write_zip(
            &archive,
            &[
                ("00_myvoice/wav/emotion001.wav", b"RIFF"),
                ("00_myvoice/text/emotion001.txt", b"hello"),
            ],
        );

        let entries = extract_archive(&archive, &dest).await.unwrap();

        assert_eq!(entries, 2);
        assert_eq!(
            std::fs::read(dest.join("00_myvoice/wav/emotion001.wav")).unwrap(),
            b"RIFF"
        );
        assert_eq!(
            std::fs::read(dest.join("00_myvoice/text/emotion001.txt")).unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn test_extract_zip_rejects_unsafe_entries() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dataset");

        for name in ["../evil.txt", "/tmp/evil.txt", "a/../../evil.txt"] {
            let archive = dir.path().join("voices.zip");
            write_zip(&archive, &[("ok.txt", b"ok"), (name, b"evil")]);

            let err = extract_archive(&archive, &dest).await.unwrap_err();

            assert!(matches!(err, UploadError::InvalidRequest(_)), "{}", name);
            assert!(!dest.join("ok.txt").exists());
            assert!(!dir.path().join("evil.txt").exists());
        }
    }

    #[tokio::test]
    async fn test_extract_zip_rejects_symlinks() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("voices.zip");
        let dest = dir.path().join("dataset");

        let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
        writer
            .add_symlink("link", "/etc/passwd", FileOptions::default())
            .unwrap();
        writer.finish().unwrap();

        let err = extract_archive(&archive, &dest).await.unwrap_err();

        assert!(matches!(err, UploadError::InvalidRequest(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_extract_rejects_corrupt_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("voices.zip");
        std::fs::write(&archive, b"PK not really").unwrap();

        let err = extract_archive(&archive, dir.path()).await.unwrap_err();

        assert!(matches!(err, UploadError::InvalidRequest(_)));
    }

    #[test]
    fn test_archive_format() {
        assert_eq!(
            archive_format(Path::new("voices.ZIP")).unwrap(),
            ArchiveFormat::Zip
        );
        assert_eq!(
            archive_format(Path::new("voices.tgz")).unwrap(),
            ArchiveFormat::TarGz
        );
        assert_eq!(
            archive_format(Path::new("voices.tar")).unwrap(),
            ArchiveFormat::Tar
        );
        assert!(archive_format(Path::new("voices.7z")).is_err());
        assert!(archive_format(Path::new("voices")).is_err());
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained(Path::new("a/b/c.wav")));
        assert!(is_contained(Path::new("./a.wav")));
        assert!(!is_contained(Path::new("/etc/passwd")));
        assert!(!is_contained(Path::new("a/../../b")));
    }
}
