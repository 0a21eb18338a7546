//! # Sitesmith
//!
//! Static site builder for many small sites, rebuilt whenever their content
//! changes. Each site lives in its own content directory and is generated
//! into its own output directory.
//!
//! # Architecture: Scheduler, Builder, Reconciler
//!
//! ```text
//! content change ──▶ BuildHandle::launch_site_build(key)
//!                          │
//!                    BuildMaster (one coordination thread)
//!                          │  one job per site key in flight,
//!                          │  newer requests coalesce
//!                          ▼
//!                    worker pool ──▶ SiteBuilder::build
//!                                        │
//!                     load → render → reconcile → sync → sass → favicon
//! ```
//!
//! Two properties hold the design together:
//!
//! - **One writer per site.** The master never hands two jobs for the same
//!   site to the pool at once, so passes for one site never race on its
//!   output directory. Different sites build in parallel.
//! - **Prune only what is stale.** Every pass records the files it
//!   generated; reconciliation deletes everything else under the site root
//!   except the directories owned by the sync steps.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scheduler`] | Coalescing per-site job master, worker pool, job runners |
//! | [`builder`] | One build pass: steps, error policy, deletion of a site |
//! | [`reconcile`] | Two-phase prune of a generated tree (plan, then apply) |
//! | [`sync`] | Flat and mirrored copies for images, files and theme assets |
//! | [`collector`] | Step-tagged error collection for one pass |
//! | [`store`] | Content store trait and the directory-backed store |
//! | [`node`] | Nodes, slugs, URLs and site-wide variables |
//! | [`render`] | Renderer trait and the Maud renderer |
//! | [`stylesheet`] | Theme SASS variables and stylesheet compilation |
//! | [`config`] | `config.toml` loading and validation |
//! | [`types`] | Site keys and content records |
//! | [`naming`] | `NNN-name` filename convention and slugs |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Last Request Wins
//!
//! A pass always regenerates the whole site from current content. While a
//! site builds, further requests for it collapse into a single pending one:
//! queueing more would redo identical work.
//!
//! ## Failed Passes Never Delete More
//!
//! A node that fails to render still counts as generated for that pass, so
//! its previous output survives until a later pass renders it again.

pub mod builder;
pub mod collector;
pub mod config;
pub mod naming;
pub mod node;
pub mod output;
pub mod reconcile;
pub mod render;
pub mod scheduler;
pub mod store;
pub mod stylesheet;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
