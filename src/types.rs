//! Content records shared between the content store, node builders and
//! the site builder.
//!
//! These are plain data: the store produces them, the builder reads them,
//! nothing mutates them during a pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("site key is empty")]
    Empty,
    #[error("site key {0:?} is not a valid directory name")]
    Invalid(String),
}

/// Stable identifier of a site.
///
/// Used to coalesce build requests and as the name of the site's output
/// directory, so it must be a single, plain path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteKey(String);

impl SiteKey {
    pub fn new(key: impl Into<String>) -> Result<Self, KeyError> {
        let key = key.into();
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        if key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
            return Err(KeyError::Invalid(key));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SiteKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SiteKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SiteKey> for String {
    fn from(key: SiteKey) -> Self {
        key.0
    }
}

/// Site-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSettings {
    pub name: String,
    pub tagline: String,
    /// Public base URL, e.g. `https://example.org/club`. Its path component
    /// prefixes every generated URL.
    pub base_url: String,
    /// Theme directory name under the configured themes dir.
    pub theme: String,
    /// Write `<slug>.html` instead of `<slug>/index.html`.
    pub ugly_urls: bool,
    /// Image id used to produce `favicon.png`.
    pub favicon: Option<String>,
    /// Image id shown in the page header.
    pub logo: Option<String>,
    /// Per-site overrides of the theme's SASS variables.
    pub sass: BTreeMap<String, String>,
    pub contact: Option<Contact>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A standalone page (`about`, `history`, ...).
#[derive(Debug, Clone)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub tagline: String,
    pub body: String,
    /// Shown in the navigation bar when set; lower sorts first.
    pub nav_order: Option<u32>,
}

/// A dated news post.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub title: String,
    /// ISO date `YYYY-MM-DD`.
    pub date: String,
    pub cover: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub title: String,
    /// ISO date `YYYY-MM-DD`.
    pub start: String,
    pub end: Option<String>,
    pub place: Option<String>,
    pub cover: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub role: Option<String>,
    pub photo: Option<String>,
    pub body: String,
    pub order: u32,
}

#[derive(Debug, Clone)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub cover: Option<String>,
    pub body: String,
    pub order: u32,
}

/// An image and the derivative files generated for it.
///
/// Derivatives are produced by an external generator; the builder only
/// copies them into the site's images directory.
#[derive(Debug, Clone)]
pub struct Image {
    pub id: String,
    pub original: PathBuf,
    pub derivatives: Vec<PathBuf>,
}

impl Image {
    /// File name the image is published under (first derivative, or the
    /// original when no derivatives exist).
    pub fn published_name(&self) -> Option<String> {
        self.derivatives
            .first()
            .unwrap_or(&self.original)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// An uploaded file (PDF, archive, ...).
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: String,
    pub path: PathBuf,
}

/// Everything the store returns for one site.
#[derive(Debug, Clone, Default)]
pub struct SiteContent {
    pub settings: SiteSettings,
    pub pages: Vec<Page>,
    pub posts: Vec<Post>,
    pub events: Vec<Event>,
    pub members: Vec<Member>,
    pub activities: Vec<Activity>,
    pub images: Vec<Image>,
    pub files: Vec<FileRecord>,
}

impl SiteContent {
    pub fn find_image(&self, id: &str) -> Option<&Image> {
        self.images.iter().find(|img| img.id == id)
    }
}
