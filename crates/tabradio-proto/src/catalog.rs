use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Which channel list is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    #[default]
    Radio,
    Tv,
}

impl CatalogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogKind::Radio => "radio",
            CatalogKind::Tv => "tv",
        }
    }

    /// Lenient parse used for persisted data: anything unrecognised is radio.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some("tv") => CatalogKind::Tv,
            _ => CatalogKind::Radio,
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable name → stream URL mapping for one kind of content.
///
/// Entries are held in a `BTreeMap`, so iteration order is the sorted key
/// order the selection is defined by.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    kind: CatalogKind,
    entries: BTreeMap<String, String>,
}

impl Catalog {
    pub fn new(kind: CatalogKind, entries: BTreeMap<String, String>) -> Self {
        Self { kind, entries }
    }

    pub fn empty(kind: CatalogKind) -> Self {
        Self::new(kind, BTreeMap::new())
    }

    /// Load a catalog, falling back to an empty one on any error.
    pub fn load(kind: CatalogKind, path: &Path) -> Self {
        match Self::try_load(kind, path) {
            Ok(catalog) => {
                info!("Loaded {} {} channels from {:?}", catalog.len(), kind, path);
                catalog
            }
            Err(e) => {
                warn!("{} catalog unavailable: {}", kind, e);
                Self::empty(kind)
            }
        }
    }

    pub fn try_load(kind: CatalogKind, path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(kind, &content).map_err(|e| match e {
            ParseFailure::Json(source) => CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            },
            ParseFailure::NotAnObject => CatalogError::NotAnObject {
                path: path.to_path_buf(),
            },
        })
    }

    fn parse(kind: CatalogKind, content: &str) -> Result<Self, ParseFailure> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(ParseFailure::Json)?;
        let serde_json::Value::Object(map) = value else {
            return Err(ParseFailure::NotAnObject);
        };
        // Non-string values keep their key but carry no URL.
        let entries = map
            .into_iter()
            .map(|(name, url)| {
                let url = match url {
                    serde_json::Value::String(s) => s,
                    _ => String::new(),
                };
                (name, url)
            })
            .collect();
        Ok(Self::new(kind, entries))
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted channel keys.
    pub fn selection(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Stream URL for `key`; `None` when the key is unknown or has no URL.
    pub fn url(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug)]
enum ParseFailure {
    Json(serde_json::Error),
    NotAnObject,
}

/// Both catalogs, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    pub radio: Catalog,
    pub tv: Catalog,
}

impl Catalogs {
    pub fn load(radio_file: &Path, tv_file: &Path) -> Self {
        Self {
            radio: Catalog::load(CatalogKind::Radio, radio_file),
            tv: Catalog::load(CatalogKind::Tv, tv_file),
        }
    }

    pub fn get(&self, kind: CatalogKind) -> &Catalog {
        match kind {
            CatalogKind::Radio => &self.radio,
            CatalogKind::Tv => &self.tv,
        }
    }
}
