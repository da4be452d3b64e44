use std::fs;
use std::path::Path;

use haven_core::BoxError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read a JSON region file. A missing file is an empty region, not an error.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, BoxError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Replace a region file: write a sibling, then rename over the live file so
/// a torn write never corrupts it.
pub fn save<T: Serialize>(path: &Path, items: &[T]) -> Result<(), BoxError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(items)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
