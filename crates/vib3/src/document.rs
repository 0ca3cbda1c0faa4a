use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use derive_more::{Display, Error, From};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::{NamedTempFile, PersistError};

/// JSON document persistence errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum DocumentError {
    /// IO-related error.
    Io(io::Error),

    /// Document is not valid JSON or has an unexpected shape.
    Json(serde_json::Error),

    /// Unable to move the temporary file onto the document path.
    Persist(PersistError),
}

/// Load a JSON document, treating a missing file as an empty document.
pub(crate) fn load<T>(path: &Path) -> Result<T, DocumentError>
where
    T: DeserializeOwned + Default,
{
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(error) => Err(error.into()),
    }
}

/// Store a pretty-printed JSON document.
///
/// The document is written into a temporary file in the same directory,
/// which then atomically replaces the previous version. Readers never observe
/// a partially written document, but concurrent writers may still overwrite
/// each other's updates.
pub(crate) fn store<T>(path: &Path, document: &T) -> Result<(), DocumentError>
where
    T: Serialize,
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(directory)?;
    serde_json::to_writer_pretty(&mut file, document)?;
    file.write_all(b"\n")?;
    file.persist(path)?;

    Ok(())
}
