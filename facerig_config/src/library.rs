//! Named motion scripts kept in one JSON object (`name -> script text`).
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::atomic::write_atomic;

#[derive(Debug, Clone, Default)]
pub struct ScriptLibrary {
    path: PathBuf,
    scripts: BTreeMap<String, String>,
}

impl ScriptLibrary {
    /// A missing or unreadable-as-JSON file yields an empty library; read
    /// errors other than not-found are reported.
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let scripts = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "script library unreadable, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => eyre::bail!("read script library {:?}: {}", path, e),
        };
        Ok(Self { path, scripts })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    /// Insert or replace `name`. Blank names are stored as "untitled";
    /// empty scripts are refused.
    pub fn insert(&mut self, name: &str, text: &str) -> eyre::Result<String> {
        let text = text.trim();
        if text.is_empty() {
            eyre::bail!("script is empty, nothing to save");
        }
        let name = match name.trim() {
            "" => "untitled".to_string(),
            n => n.to_string(),
        };
        self.scripts.insert(name.clone(), text.to_string());
        Ok(name)
    }

    pub fn save(&self) -> eyre::Result<()> {
        let text = serde_json::to_string_pretty(&self.scripts)?;
        write_atomic(&self.path, text.as_bytes())
            .map_err(|e| eyre::eyre!("write script library {:?}: {}", self.path, e))
    }
}
