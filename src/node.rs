//! Nodes: the units of generated content.
//!
//! Loading turns the site's records into nodes, one per output file:
//!
//! | Kind | Output | In navbar |
//! |------|--------|-----------|
//! | homepage | `index.html` | no |
//! | page | `<title>/index.html` | when numbered |
//! | post | `posts/YYYY/MM/DD/<title>/index.html` | no |
//! | posts | `posts/index.html` | yes (5) |
//! | event | `events/<start>/<title>/index.html` | no |
//! | events | `events/index.html` | yes (10) |
//! | members | `members/index.html` | yes (15) |
//! | activities | `activities/index.html` | yes (20) |
//! | contact | `contact/index.html` | yes (25) |
//!
//! With `ugly_urls` the `<slug>/index.html` form becomes `<slug>.html`.
//! Slugs are unique within a pass; see [`SlugRegistry`].

use crate::naming::{SlugRegistry, pathify, slugify};
use crate::types::{Contact, SiteContent, SiteSettings};
use std::fmt;
use std::path::PathBuf;

/// Navbar order for nodes that do not set one.
pub const DEFAULT_NAV_ORDER: u32 = 100;

/// Images directory under a site's output root.
pub const IMAGES_DIR: &str = "img";
/// Uploaded files directory under a site's output root.
pub const FILES_DIR: &str = "files";
/// Theme assets directory under a site's output root.
pub const ASSETS_DIR: &str = "assets";
pub const FAVICON_FILE: &str = "favicon.png";

/// Output root entries owned by the sync steps. No node may be placed
/// under them.
pub const RESERVED_ROOTS: [&str; 4] = [ASSETS_DIR, IMAGES_DIR, FILES_DIR, FAVICON_FILE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Homepage,
    Page,
    Post,
    Posts,
    Event,
    Events,
    Members,
    Activities,
    Contact,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Homepage => "homepage",
            NodeKind::Page => "page",
            NodeKind::Post => "post",
            NodeKind::Posts => "posts",
            NodeKind::Event => "event",
            NodeKind::Events => "events",
            NodeKind::Members => "members",
            NodeKind::Activities => "activities",
            NodeKind::Contact => "contact",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a node shown in a list (posts list, homepage, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub title: String,
    pub url: String,
    pub date: Option<String>,
    pub cover: Option<String>,
    /// Markdown body.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberCard {
    pub name: String,
    pub role: Option<String>,
    pub photo: Option<String>,
    pub body: String,
}

/// What a node displays. Bodies are markdown; the renderer converts them.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Homepage { recent: Vec<Entry> },
    Page { body: String },
    Post(Entry),
    Posts(Vec<Entry>),
    Event { entry: Entry, end: Option<String>, place: Option<String> },
    Events(Vec<Entry>),
    Members(Vec<MemberCard>),
    Activities(Vec<Entry>),
    Contact(Contact),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub title: String,
    pub tagline: String,
    /// Unique slug, e.g. `posts/2024/05/01/open-day`. Empty for the homepage.
    pub slug: String,
    /// Output path relative to the site root, e.g. `posts/index.html`.
    pub file_path: PathBuf,
    /// Site-relative URL including the base path, e.g. `/club/posts/`.
    pub url: String,
    pub absolute_url: String,
    pub in_nav: bool,
    pub nav_order: u32,
    pub content: NodeContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavItem {
    pub title: String,
    pub url: String,
}

/// Site-wide variables shared by every rendered node.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteVars {
    pub name: String,
    pub tagline: String,
    pub base_path: String,
    pub logo: Option<String>,
    pub has_favicon: bool,
    pub nav: Vec<NavItem>,
}

impl SiteVars {
    /// Derive site variables from the loaded nodes.
    ///
    /// The navbar lists navbar nodes by order, then title.
    pub fn compute(content: &SiteContent, nodes: &[Node]) -> Self {
        let urls = UrlScheme::new(&content.settings);
        let mut nav_nodes: Vec<&Node> = nodes.iter().filter(|n| n.in_nav).collect();
        nav_nodes.sort_by(|a, b| (a.nav_order, &a.title).cmp(&(b.nav_order, &b.title)));

        Self {
            name: content.settings.name.clone(),
            tagline: content.settings.tagline.clone(),
            base_path: urls.base_path.clone(),
            logo: content
                .settings
                .logo
                .as_deref()
                .and_then(|id| image_url(content, &urls, id)),
            has_favicon: content.settings.favicon.is_some(),
            nav: nav_nodes
                .into_iter()
                .map(|n| NavItem {
                    title: n.title.clone(),
                    url: n.url.clone(),
                })
                .collect(),
        }
    }
}

/// Turns slugs into output paths and URLs for one site.
#[derive(Debug)]
struct UrlScheme {
    base_path: String,
    base_url: String,
    ugly: bool,
    slugs: SlugRegistry,
}

impl UrlScheme {
    fn new(settings: &SiteSettings) -> Self {
        let mut slugs = SlugRegistry::new();
        for reserved in RESERVED_ROOTS {
            slugs.claim(reserved);
        }
        Self {
            base_path: base_path(&settings.base_url),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            ugly: settings.ugly_urls,
            slugs,
        }
    }

    /// Claim a slug and compute `(slug, file_path, url, absolute_url)`.
    fn place(&mut self, raw_slug: &str) -> (String, PathBuf, String, String) {
        let slug = self.slugs.claim(&pathify(raw_slug));
        let (file_path, last) = if self.ugly || slug.is_empty() || slug == "index" {
            let name = if slug.is_empty() { "index" } else { slug.as_str() };
            let file = format!("{name}.html");
            let last = if name == "index" {
                "/".to_string()
            } else {
                format!("/{file}")
            };
            (PathBuf::from(file), last)
        } else {
            (
                PathBuf::from(&slug).join("index.html"),
                format!("/{slug}/"),
            )
        };
        let url = format!("{}{}", self.base_path, last);
        let absolute = format!("{}{}", self.base_url, last);
        (slug, file_path, url, absolute)
    }

    fn node(&mut self, kind: NodeKind, raw_slug: &str, title: &str, content: NodeContent) -> Node {
        let (slug, file_path, url, absolute_url) = self.place(raw_slug);
        Node {
            kind,
            title: title.to_string(),
            tagline: String::new(),
            slug,
            file_path,
            url,
            absolute_url,
            in_nav: false,
            nav_order: DEFAULT_NAV_ORDER,
            content,
        }
    }
}

/// Path component of a base URL without trailing slash.
///
/// `https://example.org/club/` → `/club`; `https://example.org` → ``.
pub fn base_path(base_url: &str) -> String {
    let after_scheme = match base_url.find("://") {
        Some(i) => &base_url[i + 3..],
        None => base_url,
    };
    match after_scheme.find('/') {
        Some(i) => after_scheme[i..].trim_end_matches('/').to_string(),
        None => String::new(),
    }
}

fn image_url(content: &SiteContent, urls: &UrlScheme, id: &str) -> Option<String> {
    match content.find_image(id).and_then(|img| img.published_name()) {
        Some(name) => Some(format!("{}/{IMAGES_DIR}/{name}", urls.base_path)),
        None => {
            tracing::warn!(image = id, "referenced image not found");
            None
        }
    }
}

/// `2024-05-01` → `2024/05/01`.
fn date_path(date: &str) -> String {
    date.split('-').collect::<Vec<_>>().join("/")
}

/// Build every node of a site, in a stable order.
pub fn load_nodes(content: &SiteContent) -> Vec<Node> {
    let mut urls = UrlScheme::new(&content.settings);
    let mut nodes = Vec::new();

    // list pages claim their slugs before records that could collide
    let mut home = urls.node(
        NodeKind::Homepage,
        "",
        &content.settings.name,
        NodeContent::Homepage { recent: Vec::new() },
    );
    home.tagline = content.settings.tagline.clone();
    let posts_slot = urls.place("posts");
    let events_slot = urls.place("events");

    for page in &content.pages {
        let mut node = urls.node(
            NodeKind::Page,
            &page.title,
            &page.title,
            NodeContent::Page {
                body: page.body.clone(),
            },
        );
        node.tagline = page.tagline.clone();
        if let Some(order) = page.nav_order {
            node.in_nav = true;
            node.nav_order = order;
        }
        nodes.push(node);
    }

    let mut post_entries = Vec::new();
    for post in &content.posts {
        let slug = format!("posts/{}/{}", date_path(&post.date), slugify(&post.title));
        let (slug, file_path, url, absolute_url) = urls.place(&slug);
        let entry = Entry {
            title: post.title.clone(),
            url: url.clone(),
            date: Some(post.date.clone()),
            cover: post.cover.as_deref().and_then(|id| image_url(content, &urls, id)),
            body: post.body.clone(),
        };
        post_entries.push(entry.clone());
        nodes.push(Node {
            kind: NodeKind::Post,
            title: post.title.clone(),
            tagline: String::new(),
            slug,
            file_path,
            url,
            absolute_url,
            in_nav: false,
            nav_order: DEFAULT_NAV_ORDER,
            content: NodeContent::Post(entry),
        });
    }
    if !post_entries.is_empty() {
        nodes.push(list_node(
            NodeKind::Posts,
            "Posts",
            5,
            posts_slot.clone(),
            NodeContent::Posts(post_entries.clone()),
        ));
    }

    let mut event_entries = Vec::new();
    for event in &content.events {
        let slug = format!("events/{}/{}", date_path(&event.start), slugify(&event.title));
        let (slug, file_path, url, absolute_url) = urls.place(&slug);
        let entry = Entry {
            title: event.title.clone(),
            url: url.clone(),
            date: Some(event.start.clone()),
            cover: event.cover.as_deref().and_then(|id| image_url(content, &urls, id)),
            body: event.body.clone(),
        };
        event_entries.push(entry.clone());
        nodes.push(Node {
            kind: NodeKind::Event,
            title: event.title.clone(),
            tagline: String::new(),
            slug,
            file_path,
            url,
            absolute_url,
            in_nav: false,
            nav_order: DEFAULT_NAV_ORDER,
            content: NodeContent::Event {
                entry,
                end: event.end.clone(),
                place: event.place.clone(),
            },
        });
    }
    if !event_entries.is_empty() {
        nodes.push(list_node(
            NodeKind::Events,
            "Events",
            10,
            events_slot,
            NodeContent::Events(event_entries),
        ));
    }

    if !content.members.is_empty() {
        let cards = content
            .members
            .iter()
            .map(|m| MemberCard {
                name: m.name.clone(),
                role: m.role.clone(),
                photo: m.photo.as_deref().and_then(|id| image_url(content, &urls, id)),
                body: m.body.clone(),
            })
            .collect();
        let slot = urls.place("members");
        nodes.push(list_node(NodeKind::Members, "Members", 15, slot, NodeContent::Members(cards)));
    }

    if !content.activities.is_empty() {
        let entries = content
            .activities
            .iter()
            .map(|a| Entry {
                title: a.title.clone(),
                url: String::new(),
                date: None,
                cover: a.cover.as_deref().and_then(|id| image_url(content, &urls, id)),
                body: a.body.clone(),
            })
            .collect();
        let slot = urls.place("activities");
        nodes.push(list_node(
            NodeKind::Activities,
            "Activities",
            20,
            slot,
            NodeContent::Activities(entries),
        ));
    }

    if let Some(contact) = &content.settings.contact {
        let slot = urls.place("contact");
        nodes.push(list_node(
            NodeKind::Contact,
            "Contact",
            25,
            slot,
            NodeContent::Contact(contact.clone()),
        ));
    }

    home.content = NodeContent::Homepage {
        recent: post_entries.into_iter().take(3).collect(),
    };
    nodes.insert(0, home);
    nodes
}

fn list_node(
    kind: NodeKind,
    title: &str,
    nav_order: u32,
    (slug, file_path, url, absolute_url): (String, PathBuf, String, String),
    content: NodeContent,
) -> Node {
    Node {
        kind,
        title: title.to_string(),
        tagline: String::new(),
        slug,
        file_path,
        url,
        absolute_url,
        in_nav: true,
        nav_order,
        content,
    }
}
