use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no manifest for AppID {0}")]
    Missing(String),
    #[error("failed to read {path}: {source}", path = .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("manifest for AppID {0} has no name field")]
    NoName(String),
}

pub trait MetadataStore {
    fn read_record(&self, item_id: &str) -> Result<String, ManifestError>;
}

#[derive(Debug, Clone)]
pub struct SteamAppsStore {
    steamapps: PathBuf,
}

impl SteamAppsStore {
    pub fn new(steamapps: impl Into<PathBuf>) -> Self {
        Self {
            steamapps: steamapps.into(),
        }
    }

    pub fn manifest_path(&self, item_id: &str) -> PathBuf {
        self.steamapps.join(format!("appmanifest_{item_id}.acf"))
    }
}

impl MetadataStore for SteamAppsStore {
    fn read_record(&self, item_id: &str) -> Result<String, ManifestError> {
        let path = self.manifest_path(item_id);
        match fs::read(&path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ManifestError::Missing(item_id.to_string()))
            }
            Err(source) => Err(ManifestError::Unreadable { path, source }),
        }
    }
}

pub struct NameResolver<S> {
    store: S,
    cached: Option<(String, String)>,
}

impl<S: MetadataStore> NameResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cached: None,
        }
    }

    pub fn resolve(&mut self, item_id: &str) -> String {
        if let Some((cached_id, name)) = &self.cached
            && cached_id == item_id
        {
            return name.clone();
        }

        match self.lookup(item_id) {
            Ok(name) => {
                debug!(item_id, name = %name, "resolved app name");
                self.cached = Some((item_id.to_string(), name.clone()));
                name
            }
            Err(err) => {
                match &err {
                    ManifestError::Missing(_) => debug!(error = %err, "app name unavailable"),
                    _ => warn!(error = %err, "app name unavailable"),
                }
                placeholder_name(item_id)
            }
        }
    }

    fn lookup(&self, item_id: &str) -> Result<String, ManifestError> {
        let record = self.store.read_record(item_id)?;
        extract_display_name(&record).ok_or_else(|| ManifestError::NoName(item_id.to_string()))
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }
}

pub fn placeholder_name(item_id: &str) -> String {
    format!("Game (AppID: {item_id})")
}

/// Accepts both `"name" "Value"` and bare `name "Value"` layouts.
pub fn extract_display_name(record: &str) -> Option<String> {
    static QUOTED_NAME_RE: OnceLock<Regex> = OnceLock::new();
    static BARE_NAME_RE: OnceLock<Regex> = OnceLock::new();

    let quoted = QUOTED_NAME_RE
        .get_or_init(|| Regex::new(r#""name"\s+"([^"]+)""#).expect("quoted name regex"));
    let bare =
        BARE_NAME_RE.get_or_init(|| Regex::new(r#"name\s+"([^"]+)""#).expect("bare name regex"));

    quoted
        .captures(record)
        .or_else(|| bare.captures(record))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
