//! Whole-file JSON persistence shared by the stores.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sv_domain::error::{Error, Result};

/// Load a JSON file, or `T::default()` when it does not exist.
///
/// A file that exists but does not parse is an error: silently starting
/// empty would drop every record on the next write.
pub(crate) fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw).map_err(Error::Json)
}

/// Write `value` to a sibling temp file and rename it over `path`.
pub(crate) fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(Error::Json)?;
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = std::fs::write(&tmp, json) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    Ok(())
}
