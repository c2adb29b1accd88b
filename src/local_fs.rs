use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::fs::{self, DirBuilder, File};

use crate::error::{Error, Result};

/// An open regular file together with its measured size.
#[derive(Debug)]
pub struct OpenedFile {
    pub file: File,
    pub path: PathBuf,
    pub size: u64,
}

impl OpenedFile {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| Error::resource(path, e))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| Error::resource(path, e))?;
        if !meta.is_file() {
            return Err(Error::resource(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            size: meta.len(),
        })
    }
}

pub async fn create_file(path: &Path) -> Result<File> {
    File::create(path)
        .await
        .map_err(|e| Error::resource(path, e))
}

/// Best effort; used to drop a partially transferred file.
pub async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        log::warn!("Could not remove partial file {}: {}", path.display(), e);
    }
}

/// Names in `dir`, sorted, hidden entries skipped, one per line.
pub async fn list_dir(dir: &Path) -> io::Result<String> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();

    let mut listing = String::new();
    for name in names {
        listing.push_str(&name);
        listing.push('\n');
    }
    Ok(listing)
}

pub async fn make_dir(path: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(path).await
}
