pub mod message_db;

pub use message_db::MessageDatabase;

use std::fs;
use std::path::Path;

/// Ensure the directory holding `db_path` exists
pub fn ensure_parent_dir(db_path: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
