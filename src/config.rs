//! Build configuration discovery and parsing.
//!
//! Storages keep their NGDP configuration under `Data/config`, addressed by
//! content hash. The files are plain `key = value` text; the build config
//! names the encoding file (content and encoding key) and the root file
//! (content key), which is everything the bootstrap needs.

use crate::error::{CascError, Result};
use crate::types::{ContentKey, EKey, locale};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// A parsed key-value configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    values: HashMap<String, String>,
}

impl ConfigFile {
    /// Parse `key = value` lines; `#` starts a comment.
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A build configuration: the config file naming the system files.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    file: ConfigFile,
}

impl BuildConfig {
    pub fn new(file: ConfigFile) -> Self {
        Self { file }
    }

    /// Whether a parsed config file looks like a build config at all.
    pub fn matches(file: &ConfigFile) -> bool {
        file.has_key("encoding") && file.has_key("root")
    }

    /// The encoding file's content key and encoding key. The value carries
    /// both hashes separated by whitespace.
    pub fn encoding_keys(&self) -> Option<(ContentKey, EKey)> {
        let mut parts = self.file.get("encoding")?.split_whitespace();
        let ckey = ContentKey::from_hex(parts.next()?)?;
        let ekey = EKey::from_hex(parts.next()?)?;
        Some((ckey, ekey))
    }

    /// The root file's content key.
    pub fn root_key(&self) -> Option<ContentKey> {
        ContentKey::from_hex(self.file.get("root")?.split_whitespace().next()?)
    }

    pub fn build_name(&self) -> Option<&str> {
        self.file.get("build-name")
    }

    /// Build number embedded in the build name, e.g. `WOW-18179patch6.0.1`.
    pub fn build_number(&self) -> Option<u32> {
        let name = self.build_name()?;
        let digits: String = name
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }
}

/// Everything the storage bootstrap needs from configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub encoding_ckey: ContentKey,
    pub encoding_ekey: EKey,
    pub root_key: ContentKey,
    pub default_locale: u32,
    pub build_name: Option<String>,
    pub build_number: u32,
}

impl StorageConfig {
    /// Discover the build config under `data_path/config` and extract the
    /// bootstrap keys.
    pub fn discover(data_path: &Path) -> Result<Self> {
        let config_dir = data_path.join("config");
        if !config_dir.is_dir() {
            return Err(CascError::FileNotFound(format!(
                "config directory {}",
                config_dir.display()
            )));
        }

        let mut files = Vec::new();
        collect_files(&config_dir, &mut files)?;
        files.sort();

        for path in &files {
            let Ok(text) = fs::read_to_string(path) else {
                continue;
            };
            let parsed = ConfigFile::parse(&text);
            if !BuildConfig::matches(&parsed) {
                trace!("not a build config: {}", path.display());
                continue;
            }

            let build = BuildConfig::new(parsed);
            let Some((encoding_ckey, encoding_ekey)) = build.encoding_keys() else {
                return Err(CascError::BadFormat(format!(
                    "build config {} has a malformed encoding entry",
                    path.display()
                )));
            };
            let Some(root_key) = build.root_key() else {
                return Err(CascError::BadFormat(format!(
                    "build config {} has a malformed root entry",
                    path.display()
                )));
            };

            debug!(
                "build config {}: build {:?}",
                path.display(),
                build.build_name()
            );
            return Ok(Self {
                encoding_ckey,
                encoding_ekey,
                root_key,
                default_locale: locale::DEFAULT,
                build_number: build.build_number().unwrap_or(0),
                build_name: build.build_name().map(str::to_string),
            });
        }

        Err(CascError::FileNotFound(format!(
            "no build config under {}",
            config_dir.display()
        )))
    }
}

/// Configs are nested two directories deep by hash prefix; walk everything.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}
