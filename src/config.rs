// src/config.rs -- project configuration and persistent defaults
// Copyright 2016-2020 the Tectonic Project
// Licensed under the MIT License.

//! Declarative per-project settings. An `eztex.toml` may sit next to the
//! input file; CLI flags dominate, the file fills in only the options the
//! user did not set, and an absent or malformed file is silently ignored.

use app_dirs2::{app_dir, AppDataType, AppInfo};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::digest::{self, DigestData};
use crate::errors::Result;
use crate::format_cache::FormatKind;

const APP_INFO: AppInfo = AppInfo {
    name: "eztex",
    author: "eztex",
};

/// The default bundle: one monolithic blob on a static host, addressed by
/// byte ranges, with a gzipped ITAR index next to it.
pub const DEFAULT_BUNDLE_URL: &str = "https://relay.fullyjustified.net/default_bundle.tar";
pub const DEFAULT_INDEX_URL: &str = "https://relay.fullyjustified.net/default_bundle.tar.index.gz";

/// Identity of the default bundle. Serves as the generation key for the
/// persistent cache manifest, the index cache, and format-cache keys.
pub const DEFAULT_BUNDLE_DIGEST: &str =
    "0c35fcc3f0a2d11e6ecfa6c2b5bb21ba40c4ca53e4e7cb2f139cfc79de22c761";

/// The name of the per-project configuration file.
pub const PROJECT_CONFIG_NAME: &str = "eztex.toml";

const STARTER_CONFIG: &str = "\
# eztex project configuration

entry = \"main.tex\"

# output = \"main.pdf\"
# format = \"latex\"
# synctex = false
# deterministic = false
# keep_intermediates = false

# [bundle]
# url = \"...\"
# index = \"...\"
";

/// Resolve the persistent cache root: an explicit override, or the
/// platform's user cache directory plus a versioned segment so the layout
/// can change in the future without clobbering old caches.
pub fn cache_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        fs::create_dir_all(p)?;
        return Ok(p.to_owned());
    }

    let p = app_dir(AppDataType::UserCache, &APP_INFO, "v1")
        .map_err(|e| crate::errmsg!("cannot resolve the user cache directory: {}", e))?;
    Ok(p)
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BundleOptions {
    pub url: Option<String>,
    pub index: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProjectConfig {
    pub entry: Option<String>,
    pub output: Option<String>,
    pub format: Option<String>,
    pub synctex: Option<bool>,
    pub deterministic: Option<bool>,
    pub keep_intermediates: Option<bool>,
    #[serde(default)]
    pub bundle: BundleOptions,
}

impl ProjectConfig {
    /// Look for a project file next to the given directory and parse it.
    /// Every failure mode (no file, unreadable, bad TOML) is treated as
    /// "no configuration".
    pub fn load_for(project_dir: &Path) -> Option<ProjectConfig> {
        let path = project_dir.join(PROJECT_CONFIG_NAME);
        let text = fs::read_to_string(path).ok()?;
        toml::from_str(&text).ok()
    }

    pub fn format_kind(&self) -> Option<FormatKind> {
        self.format.as_deref().and_then(|f| FormatKind::from_str(f).ok())
    }
}

/// Write the starter project file for `eztex init`. Refuses to overwrite.
pub fn write_starter_config(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(PROJECT_CONFIG_NAME);

    if path.exists() {
        return Err(crate::errmsg!(
            "\"{}\" already exists; not overwriting it",
            path.display()
        ));
    }

    fs::write(&path, STARTER_CONFIG)?;
    Ok(path)
}

/// The fully resolved bundle endpoints for a compile.
#[derive(Clone, Debug)]
pub struct BundleEndpoints {
    pub bundle_url: String,
    pub index_url: String,
    pub digest: DigestData,
}

impl BundleEndpoints {
    /// Apply the project file's overrides on top of the defaults.
    /// Overriding the bundle URL also overrides the digest: the cache
    /// generation key becomes the hash of the URL itself, which is stable
    /// and never collides with the pinned default identity.
    pub fn resolve(config: Option<&ProjectConfig>) -> BundleEndpoints {
        let bundle = config.map(|c| &c.bundle);
        let url_override = bundle.and_then(|b| b.url.clone());
        let index_override = bundle.and_then(|b| b.index.clone());

        match url_override {
            Some(url) => {
                let index_url = index_override.unwrap_or_else(|| format!("{}.index.gz", url));
                let digest = digest::of_bytes(url.as_bytes());
                BundleEndpoints {
                    bundle_url: url,
                    index_url,
                    digest,
                }
            }
            None => BundleEndpoints {
                bundle_url: DEFAULT_BUNDLE_URL.to_owned(),
                index_url: index_override.unwrap_or_else(|| DEFAULT_INDEX_URL.to_owned()),
                digest: DigestData::from_str(DEFAULT_BUNDLE_DIGEST)
                    .expect("default bundle digest is well-formed"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_full_project_file() {
        let text = r#"
            entry = "thesis.tex"
            output = "out/thesis.pdf"
            format = "plain"
            synctex = true
            deterministic = true
            keep_intermediates = true

            [bundle]
            url = "https://bundles.example.org/tl.tar"
            index = "https://bundles.example.org/tl.tar.index.gz"
        "#;

        let c: ProjectConfig = toml::from_str(text).unwrap();
        assert_eq!(c.entry.as_deref(), Some("thesis.tex"));
        assert_eq!(c.format_kind(), Some(FormatKind::Plain));
        assert_eq!(c.synctex, Some(true));
        assert_eq!(
            c.bundle.url.as_deref(),
            Some("https://bundles.example.org/tl.tar")
        );
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PROJECT_CONFIG_NAME), "entry = [not toml").unwrap();
        assert!(ProjectConfig::load_for(dir.path()).is_none());
    }

    #[test]
    fn missing_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectConfig::load_for(dir.path()).is_none());
    }

    #[test]
    fn url_override_rewrites_digest_and_index() {
        let mut c = ProjectConfig::default();
        c.bundle.url = Some("https://mirror.example.org/b.tar".to_owned());

        let eps = BundleEndpoints::resolve(Some(&c));
        assert_eq!(eps.bundle_url, "https://mirror.example.org/b.tar");
        assert_eq!(eps.index_url, "https://mirror.example.org/b.tar.index.gz");
        assert_ne!(
            eps.digest,
            DigestData::from_str(DEFAULT_BUNDLE_DIGEST).unwrap()
        );
    }

    #[test]
    fn defaults_without_config() {
        let eps = BundleEndpoints::resolve(None);
        assert_eq!(eps.bundle_url, DEFAULT_BUNDLE_URL);
        assert_eq!(eps.index_url, DEFAULT_INDEX_URL);
        assert_eq!(eps.digest.to_string(), DEFAULT_BUNDLE_DIGEST);
    }

    #[test]
    fn starter_config_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let p = write_starter_config(dir.path()).unwrap();
        assert!(p.exists());
        assert!(write_starter_config(dir.path()).is_err());
    }
}
