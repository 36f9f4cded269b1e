use std::path::Path;

use anyhow::{Result, bail};

/// The input list must be an existing file.
pub(crate) fn ensure_input_file(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    Ok(())
}

/// The output folder is never created; it must already exist.
pub(crate) fn ensure_output_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    Ok(())
}
