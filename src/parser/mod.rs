//! Target list parsing.
//!
//! A target list is plain text with one URL per line. Trailing whitespace is
//! stripped, blank lines and `#` comment lines are ignored, and every other
//! line becomes one [`TargetSpec`]. Lines are not validated here: a
//! malformed URL becomes a target that fails with `InvalidTarget`.
//!
//! # Example
//!
//! ```
//! use batch_fetch_core::parser::parse_target_list;
//!
//! let targets = parse_target_list(
//!     "https://example.com/a.jpg\n\nhttps://mirror.example.com/a.jpg\n",
//! );
//! assert_eq!(targets.len(), 2);
//! assert_eq!(targets[0].id, "a.jpg");
//! assert_eq!(targets[1].id, "a_2.jpg");
//! ```

mod error;
mod target_id;

pub use error::InputError;
pub use target_id::{derive_target_id, unique_id};

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, instrument};

use crate::fetch::TargetSpec;

/// Parses a target list into specs with unique ids.
#[must_use]
pub fn parse_target_list(text: &str) -> Vec<TargetSpec> {
    let mut taken = HashSet::new();
    let mut targets = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let url = line.trim();
        if url.is_empty() || url.starts_with('#') {
            continue;
        }
        let id = unique_id(derive_target_id(url, index + 1), &mut taken);
        targets.push(TargetSpec::new(id, url));
    }

    targets
}

/// Reads and parses a target list file.
///
/// # Errors
///
/// Returns [`InputError::NotFound`] if the file does not exist and
/// [`InputError::Read`] if it cannot be read as UTF-8 text.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_target_file(path: &Path) -> Result<Vec<TargetSpec>, InputError> {
    if !path.exists() {
        return Err(InputError::not_found(path));
    }
    let text = std::fs::read_to_string(path).map_err(|source| InputError::read(path, source))?;
    let targets = parse_target_list(&text);
    debug!(targets = targets.len(), "target list loaded");
    Ok(targets)
}
