use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "project_management.db";
pub const DEFAULT_BACKUP_DIR: &str = "backup";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PembukuanConfig {
    pub database: Option<String>,
    pub photo_dir: Option<String>,
    pub backup_dir: Option<String>,
    /// Username to log in as when none is given
    pub user: Option<String>,
}

/// Paths after applying config file values and defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub database: PathBuf,
    pub photo_dir: PathBuf,
    pub backup_dir: PathBuf,
}

impl PembukuanConfig {
    /// `database` overrides the config file; photos default to a
    /// `photos/` directory next to the database
    pub fn resolve(&self, database: Option<&Path>) -> ResolvedPaths {
        let database = database
            .map(Path::to_path_buf)
            .or_else(|| self.database.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
        let photo_dir = self.photo_dir.as_ref().map(PathBuf::from).unwrap_or_else(|| {
            database
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(crate::storage::sqlite::DEFAULT_PHOTO_DIR)
        });
        let backup_dir = self
            .backup_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));
        ResolvedPaths { database, photo_dir, backup_dir }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("pembukuan.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<PembukuanConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: PembukuanConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &PembukuanConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let paths = PembukuanConfig::default().resolve(None);
        assert_eq!(paths.database, PathBuf::from("project_management.db"));
        assert_eq!(paths.photo_dir, PathBuf::from("photos"));
        assert_eq!(paths.backup_dir, PathBuf::from("backup"));
    }

    #[test]
    fn test_flag_beats_file() {
        let config = PembukuanConfig {
            database: Some("data/buku.db".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve(None).photo_dir, PathBuf::from("data/photos"));
        let paths = config.resolve(Some(Path::new("other.db")));
        assert_eq!(paths.database, PathBuf::from("other.db"));
    }

    #[test]
    fn test_write_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pembukuan.toml");
        assert!(load_config(Some(&path)).unwrap().is_none());

        let config = PembukuanConfig {
            user: Some("admin".to_string()),
            ..Default::default()
        };
        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        assert_eq!(load_config(Some(&path)).unwrap(), Some(config));
    }
}
