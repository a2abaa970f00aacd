//! Model asset loading

use std::path::{Path, PathBuf};

use tracing::info;

use crate::runtime::TractRuntime;
use crate::{ClassifierError, Result};

/// Asset name used when none is configured
pub const DEFAULT_MODEL_NAME: &str = "model.onnx";

/// Reads packaged model files from an asset directory
#[derive(Debug, Clone)]
pub struct ModelLoader {
    asset_dir: PathBuf,
}

impl ModelLoader {
    pub fn new(asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
        }
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    /// Full path of asset `name`
    pub fn asset_path(&self, name: &str) -> PathBuf {
        self.asset_dir.join(name)
    }

    /// Read the model bytes once
    pub fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.asset_path(name);
        let bytes = std::fs::read(&path).map_err(|e| {
            ClassifierError::ModelLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        if bytes.is_empty() {
            return Err(ClassifierError::ModelLoad(format!(
                "model asset {} is empty",
                path.display()
            )));
        }
        info!("Loaded model asset {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes)
    }

    /// Load and prepare an ONNX model
    pub fn load_runtime(&self, name: &str) -> Result<TractRuntime> {
        let bytes = self.load(name)?;
        TractRuntime::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("classifier-loader-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_bytes() {
        let dir = scratch_dir("bytes");
        std::fs::write(dir.join("m.onnx"), [1u8, 2, 3]).unwrap();

        let loader = ModelLoader::new(&dir);
        assert_eq!(loader.asset_dir(), dir.as_path());
        assert_eq!(loader.load("m.onnx").unwrap(), vec![1, 2, 3]);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_and_empty_assets() {
        let dir = scratch_dir("empty");
        std::fs::write(dir.join("empty.onnx"), b"").unwrap();

        let loader = ModelLoader::new(&dir);
        assert!(matches!(loader.load("empty.onnx"), Err(ClassifierError::ModelLoad(_))));
        assert!(matches!(loader.load(DEFAULT_MODEL_NAME), Err(ClassifierError::ModelLoad(_))));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
