pub mod document;
pub mod sheet;
pub mod xml;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::bohm::tools::error::Result;

/// Writes `content` to `path` via a temporary sibling and a rename, so readers
/// never observe a half-written file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)?;
    Ok(())
}
