use clap::{Parser, Subcommand};
use site_renewal::{config, hints, output, pipeline, store};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use site_renewal::ops::Scope;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

/// Shared flags for commands that plan changes.
#[derive(clap::Args, Clone)]
struct ChangeArgs {
    /// Domain to operate on
    domain: String,

    /// Scopes to touch (comma separated: all,css,seo,images,logo,content,nav,head)
    #[arg(long, value_delimiter = ',', default_value = "all")]
    scope: Vec<Scope>,

    /// Path to a scope-tagged hints JSON document
    #[arg(long)]
    hints: Option<PathBuf>,

    /// Free-text instruction, recorded on the change set (not interpreted)
    #[arg(long)]
    prompt: Option<String>,
}

#[derive(Parser)]
#[command(name = "site-renewal")]
#[command(about = "Incremental re-optimization pipeline for existing websites")]
#[command(long_about = "\
Incremental re-optimization pipeline for existing websites

A site is crawled and analyzed once (init); after that every change request
flows through the durable site state: structured hints are planned into a
change set, applied transactionally, and only the affected output files are
rebuilt. Unchanged files are reproduced byte-identically from the previous
build, and every pass leaves an inspectable audit trail.

Store layout (one directory per domain):

  .site-renewal/
  └── example.com/
      ├── state.json               # current versioned site state
      ├── changesets/              # append-only change set records
      └── builds/<build-id>/       # output files + manifest.json + preview

Typical flow:

  site-renewal init crawl.json
  site-renewal plan example.com --scope css --hints hints.json
  site-renewal apply example.com --scope css --hints hints.json
  site-renewal history example.com

Run 'site-renewal gen-config' to generate a documented renewal.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = "renewal.toml", global = true)]
    config: PathBuf,

    /// Override the store directory from config
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a domain's site state from a crawl snapshot document
    Init {
        /// Path to the crawl snapshot JSON
        snapshot: PathBuf,
    },
    /// Plan a change set without applying it
    Plan(ChangeArgs),
    /// Plan, apply, build, and preview one post-edit pass
    Apply(ChangeArgs),
    /// List recorded change sets, newest first
    History {
        /// Domain to list
        domain: String,
    },
    /// Show the current state, or one build's manifest
    Show {
        /// Domain to inspect
        domain: String,
        /// Build id to show the manifest of
        #[arg(long)]
        build: Option<String>,
    },
    /// Print a stock renewal.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = config::load_config(&cli.config)?;
    if let Some(store_dir) = cli.store_dir {
        config.store_dir = store_dir;
    }
    let store = store::StateStore::new(&config.store_dir);

    match cli.command {
        Command::Init { snapshot } => {
            let json = std::fs::read_to_string(&snapshot)?;
            let snapshot = hints::CrawlSnapshot::from_json(&json)?;
            let domain = snapshot.domain.clone();
            let state = pipeline::initialize(&store, &config, snapshot)?;
            println!(
                "Initialized {} at version {} ({} pages)",
                domain,
                state.version,
                state.state.pages.len()
            );
        }
        Command::Plan(args) => {
            let current = store.load(&args.domain)?;
            let hints = load_hints(args.hints.as_deref())?;
            let change_set = site_renewal::plan::plan(&current.state, &args.scope, &hints)?;
            output::print_lines(&output::format_plan(&change_set));
        }
        Command::Apply(args) => {
            init_thread_pool(&config.builder);
            let hints = load_hints(args.hints.as_deref())?;
            let request = pipeline::PostEditRequest {
                domain: args.domain,
                scopes: args.scope,
                prompt: args.prompt,
                hints,
            };
            let outcome = pipeline::run_post_edit(&store, &config, &request)?;
            output::print_lines(&output::format_outcome(&outcome));
        }
        Command::History { domain } => {
            let records: Result<Vec<_>, _> = store.history(&domain)?.collect();
            output::print_lines(&output::format_history(&records?));
        }
        Command::Show { domain, build } => match build {
            Some(build_id) => match store.load_manifest(&domain, &build_id)? {
                Some(manifest) => {
                    output::print_lines(&output::format_manifest(&manifest));
                }
                None => println!("No manifest for build {build_id}"),
            },
            None => {
                let current = store.load(&domain)?;
                output::print_lines(&output::format_state(&domain, &current));
            }
        },
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn load_hints(path: Option<&std::path::Path>) -> Result<hints::ScopeHints, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(hints::ScopeHints::from_json(&json)?)
        }
        None => Ok(hints::ScopeHints::default()),
    }
}

/// Initialize the rayon thread pool from builder config.
///
/// Caps at the number of available CPU cores — user can constrain down,
/// not up.
fn init_thread_pool(builder: &config::BuilderConfig) {
    let threads = config::effective_workers(builder);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
