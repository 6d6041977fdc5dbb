#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use kiln_config::manifest::MANIFEST_FILE;
use kiln_config::state::{RecordedOutcome, STATE_FILE};
use kiln_config::{BuildRecord, Manifest};
use kiln_engine::{Catalog, DirStore, Engine, Outcome, TargetId, TargetKind};
use kiln_targets::cluster_config::CLUSTER_CONFIG_FILE;
use kiln_targets::ClusterConfig;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

/// Directory holding kiln's own state, relative to the project root.
const STATE_DIR: &str = ".kiln";

#[derive(Debug, Parser)]
#[command(name = "kiln", about = "An incremental builder for cluster install assets")]
#[command(version)]
struct Cli {
    /// Log engine decisions at debug level
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new kiln project
    Init {
        /// Cluster name (defaults to the current directory's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Build assets, reusing any produced by an earlier run
    Create {
        /// Targets to build, by name (defaults to every target)
        targets: Vec<String>,
        /// Output directory (defaults to [output].dir in kiln.toml)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// List the available targets and their dependencies
    List,
    /// Show what the last run produced
    Status,
    /// Remove produced assets and build state
    Clean,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Init { name } => cmd_init(name),
        Command::Create { targets, dir } => cmd_create(&targets, dir),
        Command::List => cmd_list(),
        Command::Status => cmd_status(),
        Command::Clean => cmd_clean(),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

/// `KILN_LOG` wins over `RUST_LOG`; `--verbose` overrides both.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("KILN_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Find the project root by looking for `kiln.toml` in the current directory.
fn project_root() -> Result<PathBuf, Box<dyn Error>> {
    let cwd = std::env::current_dir()?;
    if !cwd.join(MANIFEST_FILE).exists() {
        return Err(
            "no kiln.toml found in current directory — run `kiln init` to create a project".into(),
        );
    }
    Ok(cwd)
}

fn cmd_init(name: Option<String>) -> CliResult {
    let cwd = std::env::current_dir()?;

    let (cluster_name, project_dir) = match name {
        Some(name) => {
            let dir = cwd.join(&name);
            (name, dir)
        }
        None => {
            let name = cwd
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("my-cluster")
                .to_owned();
            (name, cwd.clone())
        }
    };

    kiln_engine::init_project(&cluster_name, &project_dir)?;

    eprintln!(
        "    Created cluster `{cluster_name}` at {}",
        project_dir.display()
    );
    eprintln!();
    eprintln!("  To get started:");
    if project_dir != cwd {
        eprintln!("    cd {cluster_name}");
    }
    eprintln!("    kiln create");
    Ok(())
}

fn cmd_create(targets: &[String], dir: Option<PathBuf>) -> CliResult {
    let root = project_root()?;
    let summary = create_in(&root, targets, dir)?;

    for (name, outcome) in &summary.completed {
        let verb = match outcome {
            Outcome::Loaded => "Loaded",
            Outcome::Generated => "Generated",
        };
        eprintln!("    {verb} {name}");
    }
    if summary.config_drift {
        eprintln!(
            "warning: {CLUSTER_CONFIG_FILE} in {} differs from kiln.toml; keeping the existing \
             settings (run `kiln clean` to start over)",
            summary.out_dir.display()
        );
    }
    eprintln!(
        "    Finished {} target(s) in {}",
        summary.completed.len(),
        summary.out_dir.display()
    );
    Ok(())
}

/// What a `create` run did.
#[derive(Debug)]
struct CreateSummary {
    out_dir: PathBuf,
    completed: Vec<(&'static str, Outcome)>,
    /// A cluster config loaded from disk no longer matches `kiln.toml`.
    config_drift: bool,
}

fn create_in(
    root: &Path,
    targets: &[String],
    dir: Option<PathBuf>,
) -> Result<CreateSummary, Box<dyn Error>> {
    let manifest = Manifest::from_path(&root.join(MANIFEST_FILE))?;
    let out_dir = dir.unwrap_or_else(|| root.join(&manifest.output.dir));
    let catalog = kiln_targets::catalog(manifest.cluster.clone());
    let requested = requested_ids(&catalog, targets)?;
    debug!(out_dir = %out_dir.display(), requested = requested.len(), "starting run");

    let store = DirStore::new(&out_dir);
    let mut engine = Engine::new(&catalog, &store);
    engine.resolve(&requested)?;

    let config_drift = config_drifted(&mut engine, &manifest)?;
    if config_drift {
        warn!(file = CLUSTER_CONFIG_FILE, "cluster config differs from kiln.toml");
    }

    kiln_engine::persist::persist_all(&out_dir, &engine)?;
    kiln_engine::persist::write_record(&root.join(STATE_FILE), &engine)?;

    let completed = engine
        .completed()
        .map(|(id, outcome, _)| (id.name(), outcome))
        .collect();
    Ok(CreateSummary {
        out_dir,
        completed,
        config_drift,
    })
}

/// Map target names to catalog ids; no names means every target.
fn requested_ids(catalog: &Catalog, names: &[String]) -> Result<Vec<TargetId>, Box<dyn Error>> {
    if names.is_empty() {
        return Ok(catalog.ids());
    }
    names
        .iter()
        .map(|name| {
            catalog.find(name).ok_or_else(|| {
                format!("unknown target `{name}` — run `kiln list` to see available targets")
                    .into()
            })
        })
        .collect()
}

fn config_drifted(engine: &mut Engine<'_>, manifest: &Manifest) -> Result<bool, Box<dyn Error>> {
    if engine.outcome(ClusterConfig::id()) != Some(Outcome::Loaded) {
        return Ok(false);
    }
    let config = engine.fetch::<ClusterConfig>()?;
    Ok(config.settings() != Some(&manifest.cluster))
}

fn cmd_list() -> CliResult {
    // Seeding does not change the graph, so any valid settings will do.
    let settings = Manifest::with_cluster("kiln", kiln_engine::init::DEFAULT_BASE_DOMAIN).cluster;
    for line in list_lines(&kiln_targets::catalog(settings)) {
        println!("{line}");
    }
    Ok(())
}

fn list_lines(catalog: &Catalog) -> Vec<String> {
    let mut lines = Vec::new();
    for id in catalog.ids() {
        lines.push(id.name().to_owned());
        let deps = catalog
            .instantiate(id)
            .map(|target| target.dependencies())
            .unwrap_or_default();
        for dep in deps {
            lines.push(format!("    needs {dep}"));
        }
    }
    lines
}

fn cmd_status() -> CliResult {
    let root = project_root()?;
    let record = BuildRecord::from_path(&root.join(STATE_FILE))?;

    if record.targets.is_empty() {
        eprintln!("    No build recorded — run `kiln create`");
        return Ok(());
    }
    for line in status_lines(&record) {
        println!("{line}");
    }
    Ok(())
}

fn status_lines(record: &BuildRecord) -> Vec<String> {
    let mut lines = Vec::new();
    for target in &record.targets {
        let outcome = match target.outcome {
            RecordedOutcome::Loaded => "loaded",
            RecordedOutcome::Generated => "generated",
        };
        lines.push(format!("{:<28} {outcome}", target.name));
        for file in &target.files {
            let short = file.sha256.get(..12).unwrap_or(&file.sha256);
            lines.push(format!("    {} ({short})", file.name));
        }
    }
    lines
}

fn cmd_clean() -> CliResult {
    let root = project_root()?;
    clean_in(&root)?;
    eprintln!("    Cleaned produced assets");
    Ok(())
}

fn clean_in(root: &Path) -> CliResult {
    let manifest = Manifest::from_path(&root.join(MANIFEST_FILE))?;
    kiln_util::fs::remove_dir_all_if_exists(&root.join(&manifest.output.dir))?;
    kiln_util::fs::remove_dir_all_if_exists(&root.join(STATE_DIR))?;
    Ok(())
}
