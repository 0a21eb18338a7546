//! Node rendering.
//!
//! The builder only sees the [`Renderer`] trait: one node in, one HTML
//! document out. [`MaudRenderer`] is the shipped implementation.
//!
//! ## HTML Generation
//!
//! Uses [maud](https://maud.lambda.xyz/) for compile-time HTML templating.
//! Markdown bodies go through pulldown-cmark; everything else is escaped by
//! maud.

use crate::node::{Entry, MemberCard, NavItem, Node, NodeContent, SiteVars};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{Parser, html as md_html};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("rendering {node}: {message}")]
    Template { node: String, message: String },
}

/// Turns a node into the bytes of its output file.
pub trait Renderer: Send + Sync {
    fn render(&self, node: &Node, site: &SiteVars) -> Result<String, RenderError>;
}

/// Built-in maud layout.
#[derive(Debug, Clone)]
pub struct MaudRenderer {
    /// Stylesheets linked from every page, relative to `<base>/assets/`.
    pub stylesheets: Vec<String>,
}

impl Default for MaudRenderer {
    fn default() -> Self {
        Self {
            stylesheets: vec!["css/style.css".to_string()],
        }
    }
}

impl Renderer for MaudRenderer {
    fn render(&self, node: &Node, site: &SiteVars) -> Result<String, RenderError> {
        let content = match &node.content {
            NodeContent::Homepage { recent } => render_homepage(node, recent),
            NodeContent::Page { body } => html! {
                article.page { (markdown(body)) }
            },
            NodeContent::Post(entry) => render_article(entry, None, None),
            NodeContent::Event { entry, end, place } => {
                render_article(entry, end.as_deref(), place.as_deref())
            }
            NodeContent::Posts(entries) | NodeContent::Events(entries) => {
                render_list(node, entries)
            }
            NodeContent::Activities(entries) => render_activities(node, entries),
            NodeContent::Members(cards) => render_members(node, cards),
            NodeContent::Contact(contact) => html! {
                section.contact {
                    h1 { (node.title) }
                    dl {
                        @if let Some(email) = &contact.email {
                            dt { "Email" }
                            dd { a href={ "mailto:" (email) } { (email) } }
                        }
                        @if let Some(phone) = &contact.phone {
                            dt { "Phone" }
                            dd { (phone) }
                        }
                        @if let Some(address) = &contact.address {
                            dt { "Address" }
                            dd { (address) }
                        }
                    }
                }
            },
        };
        Ok(self.layout(node, site, content).into_string())
    }
}

impl MaudRenderer {
    fn layout(&self, node: &Node, site: &SiteVars, content: Markup) -> Markup {
        let title = if node.title == site.name || site.name.is_empty() {
            node.title.clone()
        } else {
            format!("{} - {}", node.title, site.name)
        };
        html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="UTF-8";
                    meta name="viewport" content="width=device-width, initial-scale=1.0";
                    title { (title) }
                    @if !node.tagline.is_empty() {
                        meta name="description" content=(node.tagline);
                    }
                    meta property="og:title" content=(node.title);
                    meta property="og:url" content=(node.absolute_url);
                    @for sheet in &self.stylesheets {
                        link rel="stylesheet" href={ (site.base_path) "/assets/" (sheet) };
                    }
                    @if site.has_favicon {
                        link rel="icon" type="image/png" href={ (site.base_path) "/favicon.png" };
                    }
                }
                body class=(node.kind.as_str()) {
                    (site_header(site, node))
                    main { (content) }
                }
            }
        }
    }
}

fn site_header(site: &SiteVars, current: &Node) -> Markup {
    html! {
        header.site-header {
            a.site-name href={ (site.base_path) "/" } {
                @if let Some(logo) = &site.logo {
                    img.logo src=(logo) alt=(site.name);
                }
                (site.name)
            }
            @if !site.nav.is_empty() {
                nav.site-nav {
                    ul {
                        @for item in &site.nav {
                            (nav_item(item, current))
                        }
                    }
                }
            }
        }
    }
}

fn nav_item(item: &NavItem, current: &Node) -> Markup {
    let is_current = current.url.starts_with(&item.url);
    html! {
        li class=[is_current.then_some("current")] {
            a href=(item.url) { (item.title) }
        }
    }
}

fn render_homepage(node: &Node, recent: &[Entry]) -> Markup {
    html! {
        section.homepage {
            h1 { (node.title) }
            @if !node.tagline.is_empty() {
                p.tagline { (node.tagline) }
            }
            @if !recent.is_empty() {
                ul.recent {
                    @for entry in recent {
                        (entry_card(entry))
                    }
                }
            }
        }
    }
}

fn render_article(entry: &Entry, end: Option<&str>, place: Option<&str>) -> Markup {
    html! {
        article {
            h1 { (entry.title) }
            p.meta {
                @if let Some(date) = &entry.date {
                    time datetime=(date) { (date) }
                }
                @if let Some(end) = end {
                    " – " time datetime=(end) { (end) }
                }
                @if let Some(place) = place {
                    " · " span.place { (place) }
                }
            }
            @if let Some(cover) = &entry.cover {
                img.cover src=(cover) alt=(entry.title);
            }
            (markdown(&entry.body))
        }
    }
}

fn render_list(node: &Node, entries: &[Entry]) -> Markup {
    html! {
        section.list {
            h1 { (node.title) }
            ul {
                @for entry in entries {
                    (entry_card(entry))
                }
            }
        }
    }
}

fn render_activities(node: &Node, entries: &[Entry]) -> Markup {
    html! {
        section.activities {
            h1 { (node.title) }
            @for entry in entries {
                article.activity {
                    h2 { (entry.title) }
                    @if let Some(cover) = &entry.cover {
                        img.cover src=(cover) alt=(entry.title) loading="lazy";
                    }
                    (markdown(&entry.body))
                }
            }
        }
    }
}

fn render_members(node: &Node, cards: &[MemberCard]) -> Markup {
    html! {
        section.members {
            h1 { (node.title) }
            @for card in cards {
                article.member {
                    @if let Some(photo) = &card.photo {
                        img.photo src=(photo) alt=(card.name) loading="lazy";
                    }
                    h2 { (card.name) }
                    @if let Some(role) = &card.role {
                        p.role { (role) }
                    }
                    (markdown(&card.body))
                }
            }
        }
    }
}

fn entry_card(entry: &Entry) -> Markup {
    html! {
        li.entry {
            a href=(entry.url) { (entry.title) }
            @if let Some(date) = &entry.date {
                " " time datetime=(date) { (date) }
            }
        }
    }
}

/// Markdown to HTML.
fn markdown(body: &str) -> Markup {
    let mut out = String::new();
    md_html::push_html(&mut out, Parser::new(body));
    PreEscaped(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, load_nodes};
    use crate::types::{Page, SiteContent, SiteSettings};

    fn site_with_page(body: &str) -> (Vec<Node>, SiteVars) {
        let content = SiteContent {
            settings: SiteSettings {
                name: "Club".into(),
                base_url: "https://example.org/club".into(),
                ..SiteSettings::default()
            },
            pages: vec![Page {
                id: "about".into(),
                title: "About".into(),
                tagline: "Who we are".into(),
                body: body.into(),
                nav_order: Some(1),
            }],
            ..SiteContent::default()
        };
        let nodes = load_nodes(&content);
        let vars = SiteVars::compute(&content, &nodes);
        (nodes, vars)
    }

    #[test]
    fn page_body_is_markdown() {
        let (nodes, vars) = site_with_page("Some *emphasis* here");
        let page = nodes.iter().find(|n| n.kind == NodeKind::Page).unwrap();
        let html = MaudRenderer::default().render(page, &vars).unwrap();
        assert!(html.contains("<em>emphasis</em>"));
        assert!(html.contains("<title>About - Club</title>"));
        assert!(html.contains(r#"<meta name="description" content="Who we are">"#));
    }

    #[test]
    fn nav_links_use_base_path_and_mark_current() {
        let (nodes, vars) = site_with_page("x");
        let page = nodes.iter().find(|n| n.kind == NodeKind::Page).unwrap();
        let html = MaudRenderer::default().render(page, &vars).unwrap();
        assert!(html.contains(r#"<li class="current"><a href="/club/about/">About</a></li>"#));
        assert!(html.contains(r#"href="/club/assets/css/style.css""#));
    }

    #[test]
    fn titles_are_escaped() {
        let (mut nodes, vars) = site_with_page("x");
        nodes[0].title = "<script>".into();
        let html = MaudRenderer::default().render(&nodes[0], &vars).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
