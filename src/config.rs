use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManuscriptConfig {
    /// Path of the project database
    pub database: Option<String>,
    /// Written into `createdBy`/`updatedBy`
    pub author: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("manuscript.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "manuscript".to_string());
    base.join(".manuscript").join(format!("{}.db", name))
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<ManuscriptConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: ManuscriptConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &ManuscriptConfig, force: bool) -> anyhow::Result<()> {
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
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manuscript.toml");
        assert!(load_config(Some(&path)).unwrap().is_none());

        let config = ManuscriptConfig {
            database: Some("novel.db".to_string()),
            author: Some("ada".to_string()),
        };
        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.database.as_deref(), Some("novel.db"));
        assert_eq!(loaded.author.as_deref(), Some("ada"));
    }

    #[test]
    fn test_default_database_named_after_directory() {
        let path = default_database_path_in(Path::new("/tmp/moby"));
        assert_eq!(path, PathBuf::from("/tmp/moby/.manuscript/moby.db"));
    }

    #[test]
    fn test_ensure_db_dir_creates_parent() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("nested").join("novel.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }
}
