use std::fs;
use std::path::Path;

use crate::error::{Result, RotavaultError};

pub fn is_safe_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Interval names end up as `<name>.<index>`, so no dots.
pub fn is_safe_interval_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn list_entries(path: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(path)
        .map_err(|e| RotavaultError::message(format!("read {}: {}", path.display(), e)))?
    {
        let entry = entry
            .map_err(|e| RotavaultError::message(format!("read {}: {}", path.display(), e)))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "." || name == ".." {
            continue;
        }
        out.push(name);
    }
    Ok(out)
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
