//! Content store: where site records come from.
//!
//! The builder only sees the [`ContentStore`] trait. [`DirStore`] is the
//! shipped implementation and treats a directory tree as the database:
//!
//! ```text
//! content/
//! └── chess-club/                 # site key
//!     ├── site.toml               # SiteSettings
//!     ├── pages/010-about.md      # numbered = shown in navigation
//!     ├── posts/2024-05-01-open-day.md
//!     ├── events/spring-tournament.md
//!     ├── members/010-alice.md
//!     ├── activities/010-lessons.md
//!     ├── images/logo.png         # originals
//!     ├── images/derivatives/logo-small.png
//!     └── files/rules.pdf
//! ```
//!
//! Markdown records may start with TOML front matter between `+++` lines.
//! The title falls back to the first `# heading`, then to the file name.

use crate::naming::parse_entry_name;
use crate::types::{
    Activity, Event, FileRecord, Image, Member, Page, Post, SiteContent, SiteKey, SiteSettings,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("site {0} not found")]
    NotFound(SiteKey),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// Source of site records. Never called concurrently for the same site.
pub trait ContentStore: Send + Sync {
    fn load_site(&self, key: &SiteKey) -> Result<SiteContent, StoreError>;

    fn list_sites(&self) -> Result<Vec<SiteKey>, StoreError>;

    /// Called after a pass for `key` completed without errors.
    fn mark_built(&self, _key: &SiteKey, _at: SystemTime) {}
}

const SETTINGS_FILE: &str = "site.toml";

/// Directory-backed content store.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    built_at: Mutex<HashMap<SiteKey, SystemTime>>,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            built_at: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Time of the last successful build of `key` in this process.
    pub fn built_at(&self, key: &SiteKey) -> Option<SystemTime> {
        self.built_at
            .lock()
            .ok()
            .and_then(|map| map.get(key).copied())
    }
}

impl ContentStore for DirStore {
    fn load_site(&self, key: &SiteKey) -> Result<SiteContent, StoreError> {
        let dir = self.root.join(key.as_str());
        let settings_path = dir.join(SETTINGS_FILE);
        if !settings_path.is_file() {
            return Err(StoreError::NotFound(key.clone()));
        }
        let settings: SiteSettings = read_toml(&settings_path)?;

        let mut pages = load_records(&dir.join("pages"), page_from)?;
        pages.sort_by_key(|p| (p.nav_order.unwrap_or(u32::MAX), p.title.clone()));

        let mut posts = load_records(&dir.join("posts"), post_from)?;
        posts.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.title.cmp(&b.title)));

        let mut events = load_records(&dir.join("events"), event_from)?;
        events.sort_by(|a, b| b.start.cmp(&a.start).then_with(|| a.title.cmp(&b.title)));

        let mut members = load_records(&dir.join("members"), member_from)?;
        members.sort_by(|a, b| (a.order, &a.name).cmp(&(b.order, &b.name)));

        let mut activities = load_records(&dir.join("activities"), activity_from)?;
        activities.sort_by(|a, b| (a.order, &a.title).cmp(&(b.order, &b.title)));

        Ok(SiteContent {
            settings,
            pages,
            posts,
            events,
            members,
            activities,
            images: load_images(&dir.join("images"))?,
            files: load_files(&dir.join("files"))?,
        })
    }

    fn list_sites(&self) -> Result<Vec<SiteKey>, StoreError> {
        let mut keys = Vec::new();
        for entry in list_dir(&self.root)? {
            if !entry.join(SETTINGS_FILE).is_file() {
                continue;
            }
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Ok(key) = SiteKey::new(name) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn mark_built(&self, key: &SiteKey, at: SystemTime) {
        if let Ok(mut map) = self.built_at.lock() {
            map.insert(key.clone(), at);
        }
    }
}

/// Front matter keys accepted by any record kind.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FrontMatter {
    title: Option<String>,
    tagline: Option<String>,
    date: Option<String>,
    start: Option<String>,
    end: Option<String>,
    place: Option<String>,
    cover: Option<String>,
    role: Option<String>,
    photo: Option<String>,
}

/// A markdown record split into its parts.
struct RawRecord {
    path: PathBuf,
    /// File stem, e.g. `010-about`
    stem: String,
    front: FrontMatter,
    body: String,
}

impl RawRecord {
    fn title(&self) -> String {
        if let Some(title) = &self.front.title {
            return title.clone();
        }
        first_heading(&self.body).unwrap_or_else(|| parse_entry_name(&self.stem).display_title)
    }

    fn order(&self) -> Option<u32> {
        parse_entry_name(&self.stem).number
    }

    fn missing(&self, field: &str) -> StoreError {
        StoreError::Invalid {
            path: self.path.clone(),
            message: format!("missing `{field}` in front matter"),
        }
    }
}

fn page_from(raw: RawRecord) -> Result<Page, StoreError> {
    Ok(Page {
        id: raw.stem.clone(),
        title: raw.title(),
        tagline: raw.front.tagline.clone().unwrap_or_default(),
        nav_order: raw.order(),
        body: raw.body,
    })
}

fn post_from(raw: RawRecord) -> Result<Post, StoreError> {
    let date = match raw.front.date.clone().or_else(|| date_prefix(&raw.stem)) {
        Some(date) => date,
        None => return Err(raw.missing("date")),
    };
    Ok(Post {
        id: raw.stem.clone(),
        title: raw.title(),
        date,
        cover: raw.front.cover.clone(),
        body: raw.body,
    })
}

fn event_from(raw: RawRecord) -> Result<Event, StoreError> {
    let Some(start) = raw.front.start.clone() else {
        return Err(raw.missing("start"));
    };
    Ok(Event {
        id: raw.stem.clone(),
        title: raw.title(),
        start,
        end: raw.front.end.clone(),
        place: raw.front.place.clone(),
        cover: raw.front.cover.clone(),
        body: raw.body,
    })
}

fn member_from(raw: RawRecord) -> Result<Member, StoreError> {
    Ok(Member {
        id: raw.stem.clone(),
        name: raw.title(),
        role: raw.front.role.clone(),
        photo: raw.front.photo.clone(),
        order: raw.order().unwrap_or(u32::MAX),
        body: raw.body,
    })
}

fn activity_from(raw: RawRecord) -> Result<Activity, StoreError> {
    Ok(Activity {
        id: raw.stem.clone(),
        title: raw.title(),
        cover: raw.front.cover.clone(),
        order: raw.order().unwrap_or(u32::MAX),
        body: raw.body,
    })
}

/// Load every `*.md` in `dir` through `convert`. A missing dir is empty.
fn load_records<T>(
    dir: &Path,
    convert: fn(RawRecord) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();
    for path in list_dir(dir)? {
        if path.extension().and_then(|e| e.to_str()) != Some("md") || !path.is_file() {
            continue;
        }
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let (front, body) = split_front_matter(&content);
        let front: FrontMatter = match front {
            Some(raw) => toml::from_str(raw).map_err(|source| StoreError::Toml {
                path: path.clone(),
                source,
            })?,
            None => FrontMatter::default(),
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        records.push(convert(RawRecord {
            path,
            stem,
            front,
            body: body.trim().to_string(),
        })?);
    }
    Ok(records)
}

fn load_images(dir: &Path) -> Result<Vec<Image>, StoreError> {
    let derivatives = list_dir(&dir.join("derivatives"))?;
    let mut images = Vec::new();
    for original in list_dir(dir)? {
        if !original.is_file() {
            continue;
        }
        let Some(stem) = original.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let prefix = format!("{stem}-");
        let own: Vec<PathBuf> = derivatives
            .iter()
            .filter(|d| {
                d.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        images.push(Image {
            id: stem,
            original,
            derivatives: own,
        });
    }
    Ok(images)
}

fn load_files(dir: &Path) -> Result<Vec<FileRecord>, StoreError> {
    Ok(list_dir(dir)?
        .into_iter()
        .filter(|p| p.is_file())
        .map(|path| FileRecord {
            id: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path,
        })
        .collect())
}

/// Sorted entries of `dir`, or nothing when it does not exist.
fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| StoreError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

/// Split `+++` TOML front matter from the body.
fn split_front_matter(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content
        .strip_prefix("+++\n")
        .or_else(|| content.strip_prefix("+++\r\n"))
    else {
        return (None, content);
    };
    match rest.find("\n+++") {
        Some(end) => {
            let front = &rest[..end];
            let after = &rest[end + 4..];
            let body = after.strip_prefix('\r').unwrap_or(after);
            (Some(front), body.strip_prefix('\n').unwrap_or(body))
        }
        None => (None, content),
    }
}

/// Title from the first `# heading` line.
fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `2024-05-01-open-day` → `2024-05-01`.
fn date_prefix(stem: &str) -> Option<String> {
    let candidate = stem.get(..10)?;
    let bytes = candidate.as_bytes();
    let shape_ok = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    shape_ok.then(|| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SiteFixture;

    #[test]
    fn front_matter_is_split_from_body() {
        let (front, body) = split_front_matter("+++\ntitle = \"Hi\"\n+++\nBody text\n");
        assert_eq!(front, Some("title = \"Hi\""));
        assert_eq!(body, "Body text\n");
    }

    #[test]
    fn content_without_front_matter_is_all_body() {
        let (front, body) = split_front_matter("# Title\n\ntext");
        assert!(front.is_none());
        assert_eq!(body, "# Title\n\ntext");
    }

    #[test]
    fn unterminated_front_matter_is_body() {
        let (front, _) = split_front_matter("+++\ntitle = 1\nno end");
        assert!(front.is_none());
    }

    #[test]
    fn date_prefix_requires_iso_shape() {
        assert_eq!(date_prefix("2024-05-01-open-day").as_deref(), Some("2024-05-01"));
        assert_eq!(date_prefix("010-about"), None);
        assert_eq!(date_prefix("short"), None);
    }

    #[test]
    fn loads_full_site() {
        let fixture = SiteFixture::new("club");
        fixture.settings("name = \"Chess Club\"\ntheme = \"plain\"\n");
        fixture.write("pages/020-history.md", "# Our History\n\nFounded long ago.");
        fixture.write("pages/010-about.md", "+++\ntitle = \"About us\"\n+++\nHello");
        fixture.write("pages/legal.md", "Legal text");
        fixture.write("posts/2024-05-01-open-day.md", "# Open day\n\nCome!");
        fixture.write("posts/2024-06-01-results.md", "# Results");
        fixture.write(
            "events/tournament.md",
            "+++\nstart = \"2024-09-01\"\nplace = \"Hall\"\n+++\n# Tournament",
        );
        fixture.write("members/020-bob.md", "+++\nrole = \"Treasurer\"\n+++\n# Bob");
        fixture.write("members/010-alice.md", "# Alice");
        fixture.write("activities/010-lessons.md", "# Lessons");
        fixture.write_bytes("images/logo.png", b"png");
        fixture.write_bytes("images/derivatives/logo-small.png", b"small");
        fixture.write_bytes("images/derivatives/other-small.png", b"other");
        fixture.write_bytes("files/rules.pdf", b"pdf");

        let store = fixture.store();
        let site = store.load_site(&fixture.key()).unwrap();

        assert_eq!(site.settings.name, "Chess Club");
        let titles: Vec<&str> = site.pages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["About us", "Our History", "legal"]);
        assert_eq!(site.pages[0].nav_order, Some(10));
        assert_eq!(site.pages[2].nav_order, None);

        // newest first
        assert_eq!(site.posts[0].title, "Results");
        assert_eq!(site.posts[1].date, "2024-05-01");

        assert_eq!(site.events[0].place.as_deref(), Some("Hall"));
        assert_eq!(site.members[0].name, "Alice");
        assert_eq!(site.members[1].role.as_deref(), Some("Treasurer"));
        assert_eq!(site.activities.len(), 1);

        assert_eq!(site.images.len(), 1);
        assert_eq!(site.images[0].id, "logo");
        assert_eq!(site.images[0].derivatives.len(), 1);
        assert_eq!(site.files[0].id, "rules.pdf");
    }

    #[test]
    fn missing_site_is_not_found() {
        let fixture = SiteFixture::new("club");
        let store = fixture.store();
        let err = store.load_site(&SiteKey::new("ghost").unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn event_without_start_is_invalid() {
        let fixture = SiteFixture::new("club");
        fixture.settings("name = \"Club\"\n");
        fixture.write("events/broken.md", "# No date");
        let err = fixture.store().load_site(&fixture.key()).unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
    }

    #[test]
    fn malformed_front_matter_is_a_toml_error() {
        let fixture = SiteFixture::new("club");
        fixture.settings("name = \"Club\"\n");
        fixture.write("pages/bad.md", "+++\ntitle = \n+++\n");
        let err = fixture.store().load_site(&fixture.key()).unwrap_err();
        assert!(matches!(err, StoreError::Toml { .. }));
    }

    #[test]
    fn lists_only_directories_with_settings() {
        let fixture = SiteFixture::new("club");
        fixture.settings("name = \"Club\"\n");
        fs::create_dir_all(fixture.content_dir().join("not-a-site")).unwrap();
        let keys = fixture.store().list_sites().unwrap();
        assert_eq!(keys, vec![SiteKey::new("club").unwrap()]);
    }

    #[test]
    fn mark_built_is_recorded() {
        let fixture = SiteFixture::new("club");
        let store = fixture.store();
        assert!(store.built_at(&fixture.key()).is_none());
        store.mark_built(&fixture.key(), SystemTime::UNIX_EPOCH);
        assert_eq!(store.built_at(&fixture.key()), Some(SystemTime::UNIX_EPOCH));
    }
}
