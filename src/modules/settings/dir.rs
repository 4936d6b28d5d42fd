// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::{
    modules::error::{code::ErrorCode, MailFusionResult},
    raise_error,
};
use std::path::PathBuf;

pub const META_FILE: &str = "meta.db";
const LOG_DIR: &str = "logs";

/// Layout of the data directory.
#[derive(Debug, Clone)]
pub struct DataDirManager {
    pub root_dir: PathBuf,
    pub meta_db: PathBuf,
    pub log_dir: PathBuf,
}

impl DataDirManager {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            meta_db: root_dir.join(META_FILE),
            log_dir: root_dir.join(LOG_DIR),
            root_dir,
        }
    }

    pub fn ensure_dirs(&self) -> MailFusionResult<()> {
        for dir in [&self.root_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                raise_error!(
                    format!("Failed to create directory {:?}: {:#?}", dir, e),
                    ErrorCode::InternalError
                )
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_layout_and_creation() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("data");
        let manager = DataDirManager::new(root.clone());
        assert!(manager.meta_db.ends_with("meta.db"));
        assert!(manager.log_dir.ends_with("logs"));

        manager.ensure_dirs().unwrap();
        assert!(root.is_dir());
        assert!(manager.log_dir.is_dir());
        // second call is a no-op
        manager.ensure_dirs().unwrap();
    }
}
