//! One synchronous build pass for one site.
//!
//! ```text
//! 1. Load content       store → SiteContent          (abort on error)
//! 2. Site variables     nodes → navbar, base path     (abort on error)
//! 3. Render nodes       node → <site>/<path>.html     (errors per node)
//! 4. Sync nodes         prune everything not rendered (generated dirs ignored)
//! 5. Sync images/files  flat copy + prune img/, files/
//!    Sync assets        mirror <theme>/assets → assets/
//! 6. Build SASS         <theme>/sass/*.scss → assets/css/*.css
//! 7. Sync favicon       16x16 PNG, or remove a stale one
//! ```
//!
//! Every failure lands in the pass's [`ErrorCollector`] under its step name.
//! From step 4 on, steps run regardless of earlier failures. A node that
//! failed to render keeps its previous output file: its path is still
//! recorded as generated, so step 4 never deletes it.
//!
//! The builder owns no concurrency. Callers guarantee that at most one pass
//! per site runs at a time.

use crate::collector::ErrorCollector;
use crate::config::Config;
use crate::node::{FILES_DIR, IMAGES_DIR, Node, RESERVED_ROOTS, SiteVars, load_nodes};
use crate::reconcile::{self, OutputSet, Plan, ReconcileError};
use crate::render::{MaudRenderer, RenderError, Renderer};
use crate::store::{ContentStore, DirStore, StoreError};
use crate::stylesheet::{
    PreludeCompiler, StylesheetCompiler, StylesheetError, compile_theme, plan_stylesheets,
};
use crate::sync::{SyncError, mirror_tree, sync_flat};
use crate::types::{SiteContent, SiteKey};
use image::ImageFormat;
use image::imageops::FilterType;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

pub use crate::node::{ASSETS_DIR, FAVICON_FILE};

pub const FAVICON_SIZE: u32 = 16;
/// Theme used when a site does not name one.
pub const DEFAULT_THEME: &str = "default";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Stylesheet(#[from] StylesheetError),
    #[error("favicon: {0}")]
    Favicon(#[from] image::ImageError),
    #[error("image {0} not found")]
    MissingImage(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("build exceeded its {}s time limit", .0.as_secs())]
    Timeout(Duration),
}

/// Collaborators and directories shared by every pass.
#[derive(Clone)]
pub struct BuildEnv {
    pub store: Arc<dyn ContentStore>,
    pub renderer: Arc<dyn Renderer>,
    pub stylesheets: Arc<dyn StylesheetCompiler>,
    pub themes_dir: PathBuf,
    pub output_dir: PathBuf,
    pub job_timeout: Option<Duration>,
}

impl BuildEnv {
    /// Directory store, maud renderer and prelude compiler over `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            store: Arc::new(DirStore::new(&config.content_dir)),
            renderer: Arc::new(MaudRenderer::default()),
            stylesheets: Arc::new(PreludeCompiler),
            themes_dir: config.themes_dir.clone(),
            output_dir: config.output_dir.clone(),
            job_timeout: config.scheduler.job_timeout(),
        }
    }

    pub fn site_dir(&self, key: &SiteKey) -> PathBuf {
        self.output_dir.join(key.as_str())
    }
}

/// Outcome of one pass.
#[derive(Debug)]
pub struct BuildReport {
    pub site: SiteKey,
    pub nodes: usize,
    /// Node files whose bytes changed.
    pub written: usize,
    pub unchanged: usize,
    /// Entries deleted by every reconciliation of the pass.
    pub removed: usize,
    pub elapsed: Duration,
    pub errors: ErrorCollector,
}

impl BuildReport {
    pub fn succeeded(&self) -> bool {
        !self.errors.has_errors()
    }
}

/// Paths under a site root owned by the sync steps, never by node rendering.
pub fn generated_roots(site_dir: &Path) -> Vec<PathBuf> {
    RESERVED_ROOTS.iter().map(|p| site_dir.join(p))
        .collect()
}

pub struct SiteBuilder<'a> {
    env: &'a BuildEnv,
    key: SiteKey,
    site_dir: PathBuf,
    started: Instant,
    timed_out: bool,
    report: BuildReport,
}

impl<'a> SiteBuilder<'a> {
    pub fn new(env: &'a BuildEnv, key: SiteKey) -> Self {
        Self {
            env,
            site_dir: env.site_dir(&key),
            started: Instant::now(),
            timed_out: false,
            report: BuildReport {
                site: key.clone(),
                nodes: 0,
                written: 0,
                unchanged: 0,
                removed: 0,
                elapsed: Duration::ZERO,
                errors: ErrorCollector::new(),
            },
            key,
        }
    }

    /// Run the full pass and dump its errors to the log.
    pub fn build(mut self) -> BuildReport {
        tracing::info!(site = %self.key, "building site");
        self.run_build();
        if self.report.errors.has_errors() {
            self.report.errors.dump(self.key.as_str());
        } else {
            self.env.store.mark_built(&self.key, SystemTime::now());
        }
        self.finish()
    }

    fn run_build(&mut self) {
        let Some((content, nodes, vars)) = self.prepare() else {
            return;
        };

        if let Err(source) = fs::create_dir_all(&self.site_dir) {
            let path = self.site_dir.clone();
            self.add("Sync nodes", BuildError::Io { path, source });
            return;
        }
        let Some(output) = self.render_nodes(&nodes, &vars, true) else {
            return;
        };
        self.sync_nodes(&output);

        let theme_dir = self.theme_dir(&content);
        if self.expired() {
            return;
        }
        self.sync_images(&content);
        self.sync_files(&content);
        if self.expired() {
            return;
        }
        self.sync_assets_and_stylesheets(&content, &theme_dir);
        if self.expired() {
            return;
        }
        self.sync_favicon(&content);
    }

    /// Load content and render every node in memory, writing nothing.
    pub fn check(mut self) -> BuildReport {
        if let Some((_, nodes, vars)) = self.prepare() {
            self.render_nodes(&nodes, &vars, false);
        }
        self.finish()
    }

    /// What the node reconciliation of a build would delete right now.
    ///
    /// Nodes are computed from current content; nothing is rendered or
    /// written.
    pub fn plan(mut self) -> (Plan, BuildReport) {
        let mut plan = Plan::default();
        if let Some((_, nodes, _)) = self.prepare() {
            let mut output = OutputSet::new(&self.site_dir);
            for node in &nodes {
                output.record_relative(&node.file_path);
            }
            plan = reconcile::plan(
                &self.site_dir,
                output.files(),
                output.dirs(),
                &generated_roots(&self.site_dir),
            );
        }
        (plan, self.finish())
    }

    fn finish(mut self) -> BuildReport {
        self.report.elapsed = self.started.elapsed();
        self.report
    }

    fn add(&mut self, step: &str, err: impl Into<BuildError>) {
        self.report.errors.add(step, err);
    }

    /// True once the job timeout has passed; records the timeout once.
    fn expired(&mut self) -> bool {
        if self.timed_out {
            return true;
        }
        if let Some(limit) = self.env.job_timeout {
            if self.started.elapsed() >= limit {
                tracing::warn!(site = %self.key, "build timed out");
                self.add("Timeout", BuildError::Timeout(limit));
                self.timed_out = true;
            }
        }
        self.timed_out
    }

    // Steps 1 and 2.
    fn prepare(&mut self) -> Option<(SiteContent, Vec<Node>, SiteVars)> {
        let content = match self.env.store.load_site(&self.key) {
            Ok(content) => content,
            Err(e) => {
                self.add("Load content", e);
                return None;
            }
        };
        let nodes = load_nodes(&content);
        self.report.nodes = nodes.len();
        if self.expired() {
            return None;
        }
        let vars = SiteVars::compute(&content, &nodes);
        if self.report.errors.has_errors() || self.expired() {
            return None;
        }
        Some((content, nodes, vars))
    }

    /// Step 3. Returns `None` when the pass timed out mid-way; reconciling
    /// a partial set would delete the nodes not reached yet.
    fn render_nodes(&mut self, nodes: &[Node], vars: &SiteVars, write: bool) -> Option<OutputSet> {
        let mut output = OutputSet::new(&self.site_dir);
        for node in nodes {
            if self.expired() {
                return None;
            }
            let step = format!("Building {}", node.kind);
            let target = output.record_relative(&node.file_path);
            let html = match self.env.renderer.render(node, vars) {
                Ok(html) => html,
                Err(e) => {
                    self.add(&step, e);
                    continue;
                }
            };
            if !write {
                continue;
            }
            match write_if_changed(&target, html.as_bytes()) {
                Ok(true) => {
                    tracing::debug!(
                        site = %self.key,
                        path = %node.file_path.display(),
                        "generated node"
                    );
                    self.report.written += 1;
                }
                Ok(false) => self.report.unchanged += 1,
                Err(e) => self.add(&step, e),
            }
        }
        Some(output)
    }

    // Step 4.
    fn sync_nodes(&mut self, output: &OutputSet) {
        let report = reconcile::reconcile_output(output, &generated_roots(&self.site_dir));
        self.report.removed += report.removed.len();
        for err in report.errors {
            self.add("Sync nodes", err);
        }
    }

    // Step 5.
    fn sync_images(&mut self, content: &SiteContent) {
        let sources: Vec<PathBuf> = content
            .images
            .iter()
            .flat_map(|img| {
                if img.derivatives.is_empty() {
                    vec![img.original.clone()]
                } else {
                    img.derivatives.clone()
                }
            })
            .collect();
        self.sync_flat_into(IMAGES_DIR, &sources, "Sync images");
    }

    fn sync_files(&mut self, content: &SiteContent) {
        let sources: Vec<PathBuf> = content.files.iter().map(|f| f.path.clone()).collect();
        self.sync_flat_into(FILES_DIR, &sources, "Sync files");
    }

    fn sync_flat_into(&mut self, dir: &str, sources: &[PathBuf], step: &str) {
        let (stats, errors) = sync_flat(&self.site_dir.join(dir), sources);
        tracing::debug!(
            site = %self.key,
            dir,
            copied = stats.copied,
            removed = stats.removed,
            "synced"
        );
        self.report.removed += stats.removed;
        for err in errors {
            self.add(step, err);
        }
    }

    // Steps 5 (assets) and 6. Compiled stylesheets live inside assets/, so
    // the mirror must know about them before it prunes.
    fn sync_assets_and_stylesheets(&mut self, content: &SiteContent, theme_dir: &Path) {
        let jobs = match plan_stylesheets(theme_dir) {
            Ok(jobs) => jobs,
            Err(e) => {
                self.add("Build SASS", e);
                Vec::new()
            }
        };
        let generated: Vec<PathBuf> = jobs.iter().map(|j| j.output.clone()).collect();

        let assets_dir = self.site_dir.join(ASSETS_DIR);
        let (stats, errors) = mirror_tree(&theme_dir.join(ASSETS_DIR), &assets_dir, &generated);
        self.report.removed += stats.removed;
        for err in errors {
            self.add("Sync assets", err);
        }

        if jobs.is_empty() || self.expired() {
            return;
        }
        let (_, errors) = compile_theme(
            theme_dir,
            &assets_dir,
            &content.settings.sass,
            self.env.stylesheets.as_ref(),
        );
        for err in errors {
            self.add("Build SASS", err);
        }
    }

    // Step 7.
    fn sync_favicon(&mut self, content: &SiteContent) {
        let path = self.site_dir.join(FAVICON_FILE);
        let Some(id) = content.settings.favicon.as_deref() else {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(site = %self.key, "removed stale favicon");
                    self.report.removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => self.add("Sync favicon", BuildError::Io { path, source }),
            }
            return;
        };
        let result = match content.find_image(id) {
            Some(img) => write_favicon(&img.original, &path),
            None => Err(BuildError::MissingImage(id.to_string())),
        };
        if let Err(e) = result {
            self.add("Sync favicon", e);
        }
    }

    fn theme_dir(&self, content: &SiteContent) -> PathBuf {
        let theme = content.settings.theme.as_str();
        let theme = if theme.is_empty() { DEFAULT_THEME } else { theme };
        self.env.themes_dir.join(theme)
    }
}

fn write_favicon(src: &Path, dest: &Path) -> Result<(), BuildError> {
    let img = image::open(src)?;
    let icon = img.resize_to_fill(FAVICON_SIZE, FAVICON_SIZE, FilterType::Lanczos3);
    let mut png = Vec::new();
    icon.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    write_if_changed(dest, &png)?;
    Ok(())
}

/// Write `bytes` unless `path` already holds them. Returns whether it wrote.
fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<bool, BuildError> {
    let io_err = |source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    };
    if fs::read(path).is_ok_and(|old| old == bytes) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, bytes).map_err(io_err)?;
    Ok(true)
}

/// Remove a site's whole output directory. Returns whether it existed.
pub fn delete_site_output(env: &BuildEnv, key: &SiteKey) -> Result<bool, BuildError> {
    let dir = env.site_dir(key);
    match fs::remove_dir_all(&dir) {
        Ok(()) => {
            tracing::info!(site = %key, path = %dir.display(), "deleted site output");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(BuildError::Io { path: dir, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::test_helpers::{SiteFixture, tiny_png};

    fn env_for(fixture: &SiteFixture) -> BuildEnv {
        fixture.env()
    }

    fn basic_site() -> SiteFixture {
        let fixture = SiteFixture::new("club");
        fixture.settings(
            "name = \"Club\"\nbase_url = \"https://example.org\"\ntheme = \"plain\"\n",
        );
        fixture.write("pages/010-about.md", "# About\n\nWe play chess.");
        fixture.write("posts/2024-05-01-open-day.md", "# Open Day\n\nCome along.");
        fixture
    }

    #[test]
    fn build_writes_nodes_and_reports() {
        let fixture = basic_site();
        let env = env_for(&fixture);

        let report = SiteBuilder::new(&env, fixture.key()).build();

        assert!(report.succeeded(), "{:?}", report.errors);
        let site = fixture.site_output();
        assert!(site.join("index.html").is_file());
        assert!(site.join("about/index.html").is_file());
        assert!(site.join("posts/index.html").is_file());
        assert!(site.join("posts/2024/05/01/open-day/index.html").is_file());
        assert_eq!(report.nodes, 4);
        assert_eq!(report.written, 4);
        assert!(fixture.store_built_at().is_some());
    }

    #[test]
    fn second_build_changes_nothing() {
        let fixture = basic_site();
        let env = env_for(&fixture);
        SiteBuilder::new(&env, fixture.key()).build();

        let report = SiteBuilder::new(&env, fixture.key()).build();

        assert!(report.succeeded());
        assert_eq!(report.written, 0);
        assert_eq!(report.unchanged, 4);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn removed_content_is_pruned() {
        let fixture = basic_site();
        let env = env_for(&fixture);
        SiteBuilder::new(&env, fixture.key()).build();
        let site = fixture.site_output();
        fs::write(site.join("files/upload.pdf"), "x").unwrap();
        fs::remove_file(fixture.site_dir().join("pages/010-about.md")).unwrap();

        let report = SiteBuilder::new(&env, fixture.key()).build();

        assert!(report.succeeded(), "{:?}", report.errors);
        assert!(!site.join("about").exists());
        assert!(site.join("index.html").exists());
        // files/ is owned by the files sync, which prunes unknown uploads
        assert!(!site.join("files/upload.pdf").exists());
        assert_eq!(report.removed, 2);
    }

    struct FailingPosts;

    impl Renderer for FailingPosts {
        fn render(&self, node: &Node, site: &SiteVars) -> Result<String, RenderError> {
            if node.kind == NodeKind::Post {
                return Err(RenderError::Template {
                    node: node.slug.clone(),
                    message: "broken template".into(),
                });
            }
            MaudRenderer::default().render(node, site)
        }
    }

    #[test]
    fn failed_render_keeps_previous_output() {
        let fixture = basic_site();
        let mut env = env_for(&fixture);
        SiteBuilder::new(&env, fixture.key()).build();
        let post = fixture
            .site_output()
            .join("posts/2024/05/01/open-day/index.html");
        let before = fs::read_to_string(&post).unwrap();

        env.renderer = Arc::new(FailingPosts);
        let report = SiteBuilder::new(&env, fixture.key()).build();

        assert!(!report.succeeded());
        assert_eq!(report.errors.step("Building post").len(), 1);
        assert_eq!(fs::read_to_string(&post).unwrap(), before);
        assert!(fixture.site_output().join("about/index.html").exists());
    }

    #[test]
    fn missing_site_aborts_after_load() {
        let fixture = SiteFixture::new("club");
        let env = env_for(&fixture);

        let report = SiteBuilder::new(&env, fixture.key()).build();

        assert_eq!(report.errors.count(), 1);
        assert_eq!(report.errors.step("Load content").len(), 1);
        assert!(!fixture.site_output().exists());
    }

    #[test]
    fn page_named_like_a_sync_dir_is_moved_aside() {
        let fixture = SiteFixture::new("club");
        fixture.settings("name = \"Club\"\n");
        fixture.write("pages/010-files.md", "# Files\n\nDownloads.");
        fixture.write_bytes("files/rules.pdf", b"pdf");
        let env = env_for(&fixture);
        let site = fixture.site_output();

        let report = SiteBuilder::new(&env, fixture.key()).build();
        assert!(report.succeeded(), "{:?}", report.errors);
        assert!(site.join("files-1/index.html").is_file());
        assert!(site.join("files/rules.pdf").is_file());
        assert!(!site.join("files/index.html").exists());

        let again = SiteBuilder::new(&env, fixture.key()).build();
        assert!(again.succeeded());
        assert_eq!(again.written, 0);
        assert_eq!(again.removed, 0);
        assert!(site.join("files-1/index.html").is_file());
    }

    #[test]
    fn images_files_and_assets_are_synced() {
        let fixture = basic_site();
        fixture.write_bytes("images/logo.png", &tiny_png());
        fixture.write_bytes("images/derivatives/logo-small.png", &tiny_png());
        fixture.write("files/rules.pdf", "pdf");
        fixture.theme_write("plain", "assets/js/site.js", "1");
        let env = env_for(&fixture);

        let report = SiteBuilder::new(&env, fixture.key()).build();

        assert!(report.succeeded(), "{:?}", report.errors);
        let site = fixture.site_output();
        assert!(site.join("img/logo-small.png").is_file());
        assert!(!site.join("img/logo.png").exists());
        assert!(site.join("files/rules.pdf").is_file());
        assert!(site.join("assets/js/site.js").is_file());
    }

    #[test]
    fn stylesheets_compile_with_site_overrides() {
        let fixture = SiteFixture::new("club");
        fixture.settings("name = \"Club\"\ntheme = \"plain\"\n[sass]\nprimary = \"red\"\n");
        fixture.theme_write("plain", "sass/_variables.scss", "$primary: #333;\n");
        fixture.theme_write(
            "plain",
            "sass/style.scss",
            "@import \"variables\";\nh1 { color: $primary; }\n",
        );
        let env = env_for(&fixture);

        let report = SiteBuilder::new(&env, fixture.key()).build();
        assert!(report.succeeded(), "{:?}", report.errors);
        let css = fixture.site_output().join("assets/css/style.css");
        assert_eq!(fs::read_to_string(&css).unwrap(), "h1 { color: red; }\n");

        // the assets mirror must not prune the compiled stylesheet
        let again = SiteBuilder::new(&env, fixture.key()).build();
        assert!(again.succeeded());
        assert_eq!(again.removed, 0);
        assert!(css.exists());
    }

    #[test]
    fn favicon_written_then_removed() {
        let fixture = SiteFixture::new("club");
        fixture.settings("name = \"Club\"\nfavicon = \"icon\"\n");
        fixture.write_bytes("images/icon.png", &tiny_png());
        let env = env_for(&fixture);

        let report = SiteBuilder::new(&env, fixture.key()).build();
        assert!(report.succeeded(), "{:?}", report.errors);
        let favicon = fixture.site_output().join(FAVICON_FILE);
        let icon = image::open(&favicon).unwrap();
        assert_eq!((icon.width(), icon.height()), (16, 16));

        fixture.settings("name = \"Club\"\n");
        let report = SiteBuilder::new(&env, fixture.key()).build();
        assert!(report.succeeded(), "{:?}", report.errors);
        assert!(!favicon.exists());
    }

    #[test]
    fn unknown_favicon_image_is_an_error() {
        let fixture = SiteFixture::new("club");
        fixture.settings("name = \"Club\"\nfavicon = \"nope\"\n");
        let env = env_for(&fixture);

        let report = SiteBuilder::new(&env, fixture.key()).build();

        let errors = report.errors.step("Sync favicon");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], BuildError::MissingImage(_)));
    }

    #[test]
    fn zero_timeout_stops_before_rendering() {
        let fixture = basic_site();
        let mut env = env_for(&fixture);
        env.job_timeout = Some(Duration::ZERO);

        let report = SiteBuilder::new(&env, fixture.key()).build();

        assert_eq!(report.errors.step("Timeout").len(), 1);
        assert_eq!(report.errors.count(), 1);
        assert!(!fixture.site_output().join("index.html").exists());
    }

    #[test]
    fn check_writes_nothing() {
        let fixture = basic_site();
        let env = env_for(&fixture);

        let report = SiteBuilder::new(&env, fixture.key()).check();

        assert!(report.succeeded());
        assert_eq!(report.nodes, 4);
        assert!(!fixture.site_output().exists());
    }

    #[test]
    fn plan_lists_stale_output_only() {
        let fixture = basic_site();
        let env = env_for(&fixture);
        SiteBuilder::new(&env, fixture.key()).build();
        let site = fixture.site_output();
        fs::create_dir_all(site.join("old")).unwrap();
        fs::write(site.join("old/index.html"), "x").unwrap();

        let (plan, report) = SiteBuilder::new(&env, fixture.key()).plan();

        assert!(report.succeeded());
        assert_eq!(plan.doomed, [site.join("old")]);
        assert!(site.join("old/index.html").exists());
    }

    #[test]
    fn delete_removes_site_dir() {
        let fixture = basic_site();
        let env = env_for(&fixture);
        SiteBuilder::new(&env, fixture.key()).build();

        assert!(delete_site_output(&env, &fixture.key()).unwrap());
        assert!(!fixture.site_output().exists());
        assert!(!delete_site_output(&env, &fixture.key()).unwrap());
    }
}
