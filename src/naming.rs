//! Naming conventions shared by the content store and node builders.
//!
//! Two concerns live here:
//!
//! - **Record file names** follow the `NNN-name` convention: an optional
//!   numeric prefix orders records, the rest becomes the display title
//!   (`020-Our-Team.md` → order 20, "Our Team").
//! - **Slugs** are the path segments a node is written under. They are
//!   lowercased, collapsed to `[a-z0-9-]`, truncated per segment, and made
//!   unique within one build pass by [`SlugRegistry`].

use std::collections::HashSet;

/// Maximum length of a single slug segment.
pub const MAX_SLUG: usize = 50;

/// A record file stem split into its ordering prefix and title.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Ordering prefix, `20` for `020-Our-Team`.
    pub number: Option<u32>,
    /// Everything after the prefix, dashes kept. The whole stem when there
    /// is no prefix.
    pub name: String,
    pub display_title: String,
}

/// Split a record stem on the `NNN-name` convention.
///
/// `"020-Our-Team"` gives 20 and "Our Team", `"001"` gives 1 and an empty
/// title, `"about"` has no number.
pub fn parse_entry_name(stem: &str) -> ParsedName {
    let (number, rest) = match stem.split_once('-') {
        Some((prefix, rest)) => match prefix.parse::<u32>() {
            Ok(n) => (Some(n), rest),
            Err(_) => (None, stem),
        },
        None => match stem.parse::<u32>() {
            Ok(n) => (Some(n), ""),
            Err(_) => (None, stem),
        },
    };
    ParsedName {
        number,
        name: rest.to_string(),
        display_title: rest.replace('-', " "),
    }
}

/// Turn free text into a URL-safe slug segment.
///
/// `"Hello, World!"` → `"hello-world"`. Never returns leading or trailing
/// dashes; may return an empty string for input without alphanumerics.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.len() > MAX_SLUG {
        slug.truncate(MAX_SLUG);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Slugify every `/`-separated segment of a path, dropping empty ones.
///
/// `"/Events/2024 Summer Fair/"` → `"events/2024-summer-fair"`.
pub fn pathify(path: &str) -> String {
    path.split('/')
        .map(slugify)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Hands out slugs that are unique within one build pass.
///
/// The first claim of `about` gets `about`, later claims get `about-1`,
/// `about-2`, and so on.
#[derive(Debug, Default)]
pub struct SlugRegistry {
    taken: HashSet<String>,
}

impl SlugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, slug: &str) -> String {
        let mut candidate = slug.to_string();
        let mut i = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{slug}-{i}");
            i += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}
