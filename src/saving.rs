use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::info;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{HydrateError, Result};
use crate::trainer::FittedModel;

/// Save a fitted model as gzip-compressed bincode
pub fn save_model(model: &FittedModel, path: &Path) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| HydrateError::Snapshot(format!("cannot create {}: {}", path.display(), e)))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serialize_into(&mut writer, model).map_err(|e| HydrateError::Snapshot(e.to_string()))?;

    let encoder = writer
        .into_inner()
        .map_err(|e| HydrateError::Snapshot(e.to_string()))?;
    encoder
        .finish()
        .and_then(|mut file| file.flush())
        .map_err(|e| HydrateError::Snapshot(e.to_string()))?;

    info!("Saved model {} to {}", model.id(), path.display());
    Ok(())
}

/// Load a model written by [`save_model`]
pub fn load_model(path: &Path) -> Result<FittedModel> {
    let file = File::open(path)
        .map_err(|e| HydrateError::Snapshot(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(GzDecoder::new(file));

    let model: FittedModel =
        deserialize_from(&mut reader).map_err(|e| HydrateError::Snapshot(e.to_string()))?;

    info!(
        "Loaded model {} trained at {}",
        model.id(),
        model.trained_at().format("%Y-%m-%d %H:%M:%S")
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_corrupt_snapshot_is_a_snapshot_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin.gz");
        assert!(matches!(load_model(&path), Err(HydrateError::Snapshot(_))));

        std::fs::write(&path, b"not gzip").unwrap();
        assert!(matches!(load_model(&path), Err(HydrateError::Snapshot(_))));
    }
}
