//! Whole-file JSON persistence with atomic replace.
//!
//! Each store owns one file. Reads return the whole value, writes replace
//! the whole value: serialize into `.{name}.tmp` beside the target, fsync,
//! then rename over it. A reader never observes a half-written file.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StoreError;

/// A JSON file holding one value of type `T`.
#[derive(Debug, Clone)]
pub struct JsonFile<T> {
    path: PathBuf,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and deserialize the file.
    ///
    /// - `Ok(None)`: the file does not exist or is blank
    /// - `Err(StoreError::Corrupt)`: the contents are not valid for `T`
    /// - `Err(StoreError::PermissionDenied | Io)`: the read itself failed
    pub async fn load(&self) -> Result<Option<T>, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::from_io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Serialize `value` and atomically replace the file with it.
    pub async fn save(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(value)?;

        let tmp_path = self.temp_path();
        let mut tmp = fs::File::create(&tmp_path)
            .await
            .map_err(|e| StoreError::from_io(&tmp_path, e))?;
        tmp.write_all(json.as_bytes())
            .await
            .map_err(|e| StoreError::from_io(&tmp_path, e))?;
        tmp.sync_all()
            .await
            .map_err(|e| StoreError::from_io(&tmp_path, e))?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::from_io(&self.path, e))?;

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}
