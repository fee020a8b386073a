//! On-disk role name to id cache (`role_id_mapping.json`)

use crate::resolver::ResolveError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// File name of the cache inside its directory
pub const ROLE_ID_MAPPING_FILE: &str = "role_id_mapping.json";

/// Reads the cache, returning an empty map when the file does not exist
pub fn load_mapping(path: &Path) -> Result<HashMap<String, i64>, ResolveError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    tracing::debug!("Load role mappings from {}", path.display());
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Writes the cache
pub fn save_mapping(path: &Path, mapping: &HashMap<String, i64>) -> Result<(), ResolveError> {
    tracing::debug!("Save role mappings as {}", path.display());
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, mapping)?;
    writer.flush()?;
    Ok(())
}
