//! Shared test utilities for the sitesmith test suite.
//!
//! [`SiteFixture`] lays out a throwaway workspace mirroring a real
//! deployment:
//!
//! ```text
//! <tmp>/
//! ├── content/<key>/   # site records, read by DirStore
//! ├── public/<key>/    # build output
//! └── themes/<name>/   # theme assets and sass
//! ```
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let fixture = SiteFixture::new("club");
//! fixture.settings("name = \"Club\"\n");
//! fixture.write("pages/010-about.md", "# About");
//!
//! let env = fixture.env();
//! let report = SiteBuilder::new(&env, fixture.key()).build();
//! assert!(fixture.site_output().join("about/index.html").exists());
//! ```

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempDir;

use crate::builder::BuildEnv;
use crate::render::MaudRenderer;
use crate::store::DirStore;
use crate::stylesheet::PreludeCompiler;
use crate::types::SiteKey;

// =========================================================================
// Fixture setup
// =========================================================================

pub struct SiteFixture {
    tmp: TempDir,
    key: SiteKey,
    store: Arc<DirStore>,
}

impl SiteFixture {
    /// Empty workspace for site `key`. No `site.toml` is written yet.
    pub fn new(key: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("content")).unwrap();
        fs::create_dir_all(tmp.path().join("themes")).unwrap();
        let store = Arc::new(DirStore::new(tmp.path().join("content")));
        Self {
            tmp,
            key: SiteKey::new(key).unwrap(),
            store,
        }
    }

    pub fn key(&self) -> SiteKey {
        self.key.clone()
    }

    pub fn content_dir(&self) -> PathBuf {
        self.tmp.path().join("content")
    }

    /// This site's records directory.
    pub fn site_dir(&self) -> PathBuf {
        self.content_dir().join(self.key.as_str())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.tmp.path().join("public")
    }

    /// This site's build output directory.
    pub fn site_output(&self) -> PathBuf {
        self.output_dir().join(self.key.as_str())
    }

    pub fn themes_dir(&self) -> PathBuf {
        self.tmp.path().join("themes")
    }

    /// Write `site.toml`.
    pub fn settings(&self, toml: &str) {
        self.write("site.toml", toml);
    }

    /// Write a text file relative to the site's records directory.
    pub fn write(&self, rel: &str, content: &str) {
        self.write_bytes(rel, content.as_bytes());
    }

    pub fn write_bytes(&self, rel: &str, bytes: &[u8]) {
        write_file(&self.site_dir().join(rel), bytes);
    }

    pub fn theme_write(&self, theme: &str, rel: &str, content: &str) {
        write_file(&self.themes_dir().join(theme).join(rel), content.as_bytes());
    }

    /// A fresh store over the content directory.
    pub fn store(&self) -> DirStore {
        DirStore::new(self.content_dir())
    }

    /// Build environment with the shipped collaborators and no timeout.
    pub fn env(&self) -> BuildEnv {
        BuildEnv {
            store: self.store.clone(),
            renderer: Arc::new(MaudRenderer::default()),
            stylesheets: Arc::new(PreludeCompiler),
            themes_dir: self.themes_dir(),
            output_dir: self.output_dir(),
            job_timeout: None,
        }
    }

    /// Last successful build recorded by the store behind [`Self::env`].
    pub fn store_built_at(&self) -> Option<SystemTime> {
        self.store.built_at(&self.key)
    }
}

fn write_file(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// A valid 32x32 PNG.
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(32, 32, image::Rgb([200, 40, 40]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
