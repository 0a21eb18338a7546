use clap::{Parser, Subcommand};
use sitesmith::builder::{BuildEnv, SiteBuilder};
use sitesmith::config::{self, Config};
use sitesmith::output;
use sitesmith::scheduler::{BuildMaster, SiteJobRunner};
use sitesmith::types::SiteKey;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitesmith")]
#[command(about = "Static site builder with per-site coalescing rebuilds")]
#[command(long_about = "\
Static site builder with per-site coalescing rebuilds

Every site is a directory of records. Builds run on a fixed worker pool;
a site never builds twice at once, and requests arriving while it builds
collapse into one follow-up build.

Content structure:

  content/
  └── chess-club/                  # Site key
      ├── site.toml                # Name, base_url, theme, favicon, sass overrides
      ├── pages/010-about.md       # Page (numbered = shown in nav)
      ├── posts/2024-05-01-open.md # Post (date from name or front matter)
      ├── events/fair.md           # Event (front matter: start, end, place)
      ├── members/010-alice.md     # Member (front matter: role, photo)
      ├── activities/010-chess.md  # Activity
      ├── images/                  # Originals + derivatives/
      └── files/                   # Uploaded files, published under files/

Output goes to <output>/<site>/. The img/, files/ and assets/ directories
and favicon.png are owned by their sync steps; everything else is pruned
down to what the current build generated.

Run 'sitesmith gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Content directory (overrides config)
    #[arg(long, global = true)]
    content: Option<PathBuf>,

    /// Output directory (overrides config)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Themes directory (overrides config)
    #[arg(long, global = true)]
    themes: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build sites through the worker pool (all sites when none given)
    Build {
        sites: Vec<SiteKey>,
        /// Print job statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the generated output of sites
    Delete {
        #[arg(required = true)]
        sites: Vec<SiteKey>,
    },
    /// Load and render a site in memory without writing anything
    Check { site: SiteKey },
    /// Show what a build would prune from a site's output
    Plan { site: SiteKey },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        _ => resolve_config(&cli)?,
    };
    run(cli.command, config)
}

fn run(command: Command, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let env = BuildEnv::from_config(&config);

    match command {
        Command::Build { sites, json } => {
            let sites = if sites.is_empty() {
                env.store.list_sites()?
            } else {
                sites
            };
            if sites.is_empty() {
                println!("No sites under {}", config.content_dir.display());
                return Ok(());
            }

            let runner = SiteJobRunner::new(env).on_report(output::print_build_report);
            let mut master = BuildMaster::new(config.scheduler.clone(), Arc::new(runner));
            master.start()?;
            let handle = master.handle();
            for site in sites {
                handle.launch_site_build(site)?;
            }
            handle.wait_idle();
            let stats = master.stop();

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!();
                output::print_scheduler_stats(&stats);
            }
            if stats.failed > 0 {
                return Err(format!("{} build(s) failed", stats.failed).into());
            }
        }
        Command::Delete { sites } => {
            let mut master =
                BuildMaster::new(config.scheduler.clone(), Arc::new(SiteJobRunner::new(env)));
            master.start()?;
            let handle = master.handle();
            for site in sites {
                handle.launch_site_deletion(site)?;
            }
            handle.wait_idle();
            let stats = master.stop();
            output::print_scheduler_stats(&stats);
            if stats.failed > 0 {
                return Err(format!("{} deletion(s) failed", stats.failed).into());
            }
        }
        Command::Check { site } => {
            let report = SiteBuilder::new(&env, site).check();
            output::print_check_report(&report);
            if !report.succeeded() {
                return Err("check failed".into());
            }
        }
        Command::Plan { site } => {
            let site_dir = config.site_output_dir(site.as_str());
            let (plan, report) = SiteBuilder::new(&env, site.clone()).plan();
            if !report.succeeded() {
                output::print_check_report(&report);
                return Err("cannot plan a site that fails to load".into());
            }
            output::print_plan(site.as_str(), &site_dir, &plan);
        }
        Command::GenConfig => print!("{}", config::stock_config_toml()),
    }

    Ok(())
}

/// Install the log subscriber. `RUST_LOG` wins unless `--verbose` is given.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file, then command-line overrides.
fn resolve_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    let mut config = config::load_config(&cli.config)?;
    if let Some(content) = &cli.content {
        config.content_dir = content.clone();
    }
    if let Some(output) = &cli.output {
        config.output_dir = output.clone();
    }
    if let Some(themes) = &cli.themes {
        config.themes_dir = themes.clone();
    }
    Ok(config)
}
