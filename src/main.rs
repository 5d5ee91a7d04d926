//! mangopeach - A manga and comic library indexer.
//!
//! Usage:
//!   mangopeach scan <PATH>                  Index a library and report changes
//!   mangopeach tree <PATH>                  Show a library's groups and bundles
//!   mangopeach pages <BUNDLE_ID>            List a bundle's pages
//!   mangopeach extract <BUNDLE_ID> <PAGE>   Write one page to a file
//!   mangopeach watch                        Rescan configured libraries periodically
//!   mangopeach --help                       Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use itertools::Itertools;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mangopeach_analyze::ChangeSet;
use mangopeach_core::{
    BundleId, CatalogTree, GroupNode, LibraryConfig, LibraryStore, MemoryLibraryStore,
    ServerConfig, default_data_dir,
};
use mangopeach_library::LibraryManager;
use mangopeach_scan::ProviderRegistry;

#[derive(Parser)]
#[command(
    name = "mangopeach",
    version,
    about = "A manga and comic library indexer",
    long_about = "mangopeach indexes folders of images and comic archives into \
                  libraries of groups and bundles, and keeps the catalog in sync \
                  with incremental rescans.\n\n\
                  The catalog is stored as catalog.json in the data directory."
)]
struct Cli {
    /// Data directory holding config.json and catalog.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory as a library and show what changed
    Scan {
        /// Library root
        path: PathBuf,

        /// Library name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the group/bundle tree of a scanned library
    Tree {
        /// Library root
        path: PathBuf,

        /// Maximum group depth to display
        #[arg(short, long)]
        depth: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List the pages of a bundle in reading order
    Pages {
        /// Bundle id (see `tree`)
        bundle_id: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Write one page of a bundle to a file
    Extract {
        /// Bundle id (see `tree`)
        bundle_id: String,

        /// Page index (0-based) or page path
        page: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Scan every configured library and rescan on their intervals until Ctrl-C
    Watch,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Catalog store plus the manager working on it.
struct App {
    store: Arc<MemoryLibraryStore>,
    manager: Arc<LibraryManager>,
    config: ServerConfig,
}

impl App {
    async fn open(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let mut config = ServerConfig::load(&ServerConfig::config_path(&data_dir))?
            .unwrap_or_default();
        config.data_dir = data_dir;

        let catalog = config.catalog_path();
        let store = Arc::new(
            MemoryLibraryStore::load(&catalog)
                .await
                .wrap_err_with(|| format!("Failed to load catalog {}", catalog.display()))?,
        );
        let manager = LibraryManager::new(
            store.clone(),
            ProviderRegistry::with_defaults(),
            config.scan.clone(),
        )?;

        Ok(Self {
            store,
            manager: Arc::new(manager),
            config,
        })
    }

    async fn save(&self) -> Result<()> {
        let catalog = self.config.catalog_path();
        self.store
            .save(&catalog)
            .await
            .wrap_err_with(|| format!("Failed to save catalog {}", catalog.display()))?;
        let size = std::fs::metadata(&catalog).map(|m| m.len()).unwrap_or(0);
        info!(path = %catalog.display(), size = %format_size(size), "Catalog saved");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let app = App::open(cli.data_dir).await?;

    match cli.command {
        Command::Scan { path, name, format } => run_scan(&app, &path, name, format).await,
        Command::Tree {
            path,
            depth,
            format,
        } => run_tree(&app, &path, depth, format).await,
        Command::Pages { bundle_id, format } => run_pages(&app, bundle_id, format).await,
        Command::Extract {
            bundle_id,
            page,
            output,
        } => run_extract(&app, bundle_id, &page, &output).await,
        Command::Watch => run_watch(&app).await,
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Register a directory as a library, rescan it and print the changes.
async fn run_scan(
    app: &App,
    path: &Path,
    name: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let path = path.canonicalize().wrap_err("Invalid path")?;
    let name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });

    let library = app.manager.register(&LibraryConfig::local(name, &path)).await?;

    let mut progress = app.manager.subscribe(&library.id).await?;
    let reporter = tokio::spawn(async move {
        loop {
            match progress.recv().await {
                Ok(update) => eprint!(
                    "\rScanning... {} dirs, {} groups, {} bundles ({:.0} dirs/s)",
                    update.dirs_scanned,
                    update.groups_found,
                    update.bundles_found,
                    update.dirs_per_second()
                ),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = app.manager.rescan_and_compare(&library.id).await;
    reporter.abort();
    eprintln!();
    let changes = result.wrap_err("Scan failed")?;
    app.save().await?;

    match format {
        OutputFormat::Text => {
            let tree = app.manager.library_tree(&library.id).await?;
            print_changes(&library.name, &path, &changes, tree.as_ref());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
    }

    Ok(())
}

/// Print the tree of a library previously indexed with `scan`.
async fn run_tree(app: &App, path: &Path, depth: Option<usize>, format: OutputFormat) -> Result<()> {
    let path = path.canonicalize().wrap_err("Invalid path")?;
    let library = app
        .store
        .find_library_by_path(&path)
        .await?
        .ok_or_else(|| eyre!("{} is not a library yet, run `mangopeach scan` first", path.display()))?;

    let Some(tree) = app.manager.library_tree(&library.id).await? else {
        bail!("Library {} has not been scanned", library.name);
    };

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(" {} - {}", library.name, tree.root_path().display());
            println!(
                " {} groups, {} bundles, {} pages",
                tree.stats.total_groups, tree.stats.total_bundles, tree.stats.total_pages
            );
            println!("{}", "─".repeat(70));
            println!();
            print_group(&tree.root, 0, depth.unwrap_or(usize::MAX));
            if tree.stats.orphaned > 0 {
                println!();
                println!("{} record(s) not attached to the tree", tree.stats.orphaned);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
    }

    Ok(())
}

async fn run_pages(app: &App, bundle_id: String, format: OutputFormat) -> Result<()> {
    let details = app.manager.bundle_details(&BundleId::new(bundle_id)).await?;

    match format {
        OutputFormat::Text => {
            for (index, page) in details.pages.iter().enumerate() {
                println!("{index:>5}  {page}");
            }
            eprintln!("{} page(s)", details.page_count());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
    }

    Ok(())
}

async fn run_extract(app: &App, bundle_id: String, page: &str, output: &Path) -> Result<()> {
    let bundle_id = BundleId::new(bundle_id);
    let data = match page.parse::<usize>() {
        Ok(index) => app.manager.image_data(&bundle_id, index).await?,
        Err(_) => app.manager.image_data_by_path(&bundle_id, page).await?,
    };

    tokio::fs::write(output, &data)
        .await
        .wrap_err_with(|| format!("Failed to write {}", output.display()))?;
    eprintln!(
        "Wrote {} to {}",
        format_size(data.len() as u64),
        output.display()
    );
    Ok(())
}

/// Initialize every configured library, then keep rescanning on schedule.
async fn run_watch(app: &App) -> Result<()> {
    if app.config.libraries.is_empty() {
        warn!(
            path = %ServerConfig::config_path(&app.config.data_dir).display(),
            "No libraries configured"
        );
        return Ok(());
    }

    let libraries = app.manager.initialize(&app.config.libraries).await;
    app.save().await?;

    let scheduled = app.manager.schedule_scans().await?;
    info!(
        libraries = libraries.len(),
        scheduled, "Watching libraries, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .wrap_err("Failed to listen for Ctrl-C")?;

    app.manager.shutdown();
    app.save().await
}

fn print_changes(name: &str, path: &Path, changes: &ChangeSet, tree: Option<&CatalogTree>) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" {} - {}", name, path.display());
    if let Some(tree) = tree {
        println!(
            " {} groups, {} bundles, {} pages",
            tree.stats.total_groups, tree.stats.total_bundles, tree.stats.total_pages
        );
    }
    println!(" {}", changes.summary());
    println!("{}", "─".repeat(70));

    if changes.is_empty() {
        println!(" No changes.");
        return;
    }

    let sections = [
        ("Added", changes.added.iter().map(|b| b.path.display().to_string()).collect_vec()),
        ("Updated", changes.updated.iter().map(|b| b.path.display().to_string()).collect_vec()),
        (
            "Moved",
            changes
                .moved
                .iter()
                .map(|m| format!("{} -> {}", m.from.path.display(), m.to.path.display()))
                .collect_vec(),
        ),
        ("Deleted", changes.deleted.iter().map(|b| b.path.display().to_string()).collect_vec()),
    ];

    for (title, lines) in sections.iter().filter(|(_, lines)| !lines.is_empty()) {
        println!();
        println!(" {title} ({}):", lines.len());
        println!("{}", lines.iter().map(|line| format!("   {line}")).join("\n"));
    }
    println!();
}

/// Print a group with its bundles and sub-groups.
fn print_group(node: &GroupNode, depth: usize, max_depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}▼ {}/", node.group.name);

    if depth >= max_depth {
        let hidden = node.bundles.len() + node.children.len();
        if hidden > 0 {
            println!("{indent}    ... {hidden} more");
        }
        return;
    }

    for bundle in &node.bundles {
        println!(
            "{indent}    {:<40} {:>5} pages  {}",
            truncate(&bundle.name, 40),
            bundle.page_count,
            bundle.id
        );
    }
    for child in &node.children {
        print_group(child, depth + 1, max_depth);
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
