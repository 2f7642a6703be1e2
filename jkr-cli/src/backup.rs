use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Keeps copies of output files that are about to be overwritten in a
/// `backup/` directory next to them
pub struct BackupManager {
    backup_dir: PathBuf,
}

impl BackupManager {
    /// Manager for files written into the same directory as `output`
    pub fn for_output(output: &Path) -> Self {
        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self {
            backup_dir: parent.join("backup"),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copies `path` into the backup directory if it exists.
    /// Format: <file name>_YYYY-MM-DD_HH-MM-SS.bak
    pub fn backup_existing(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.is_file() {
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir).context("Failed to create backup directory")?;

        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let filename = format!("{}_{}.bak", name, Local::now().format("%Y-%m-%d_%H-%M-%S"));
        let backup_path = self.backup_dir.join(filename);

        fs::copy(path, &backup_path)
            .with_context(|| format!("Failed to back up {}", path.display()))?;

        Ok(Some(backup_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("mhfdat.bin");
        fs::write(&output, b"old contents").unwrap();

        let bm = BackupManager::for_output(&output);
        let backup_path = bm.backup_existing(&output).unwrap().unwrap();

        assert!(backup_path.starts_with(temp_dir.path().join("backup")));
        assert!(
            backup_path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap()
                .starts_with("mhfdat.bin_")
        );
        assert_eq!(fs::read(backup_path).unwrap(), b"old contents");
    }

    #[test]
    fn test_missing_file_is_not_backed_up() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("fresh.bin");

        let bm = BackupManager::for_output(&output);
        assert!(bm.backup_existing(&output).unwrap().is_none());
        assert!(!bm.backup_dir().exists());
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        let bm = BackupManager::for_output(Path::new("out.bin"));
        assert_eq!(bm.backup_dir(), Path::new("./backup"));
    }
}
