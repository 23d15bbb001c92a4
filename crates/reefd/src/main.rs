//! `reefd`: the Reef command-line node.
//!
//! Adds files and directories to a local block repository, reads them back,
//! and serves raw blocks over HTTP.
//!
//! # Usage
//!
//! ```text
//! reefd add ./photos                     # add a directory, print every entry
//! reefd add big.iso --raw-leaves --nocopy # reference the file instead of copying it
//! reefd add notes.txt --trickle --wrap   # trickle layout, wrapped in a directory
//! reefd cat <cid>                        # print a file's content
//! reefd block get <cid>                  # print one block's raw bytes
//! reefd serve -l 127.0.0.1:8080          # raw-block HTTP gateway
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use reef_adder::{Adder, AdderConfig, FileNode, read_file};
use reef_gateway::Gateway;
use reef_store::{BlockStore, FileBlockStore, Filestore, MemoryBlockStore, MemoryPinner, Pinner};
use reef_types::{ChunkerConfig, Cid, HashFunction, Layout};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "reefd", version, about = "Reef content-addressed file store")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the repository directory.
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep blocks in memory only (nothing persists after exit).
    #[arg(short, long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a file or directory and print its identifier.
    Add {
        /// File or directory to add.
        path: PathBuf,

        #[command(flatten)]
        options: AddOptions,
    },

    /// Print the content of a file.
    Cat {
        /// File identifier.
        cid: Cid,
    },

    /// Raw block operations.
    Block {
        #[command(subcommand)]
        action: BlockCommands,
    },

    /// Serve raw blocks over HTTP.
    Serve {
        /// Override the listen address (e.g. "127.0.0.1:8080").
        #[arg(short = 'l', long)]
        listen_addr: Option<String>,
    },
}

#[derive(Subcommand)]
enum BlockCommands {
    /// Print the raw bytes of one block.
    Get {
        /// Block identifier.
        cid: Cid,
    },
}

/// `add` flags; each one overrides the `[add]` config section.
#[derive(clap::Args, Debug, Default)]
struct AddOptions {
    /// Store chunks as raw blocks.
    #[arg(long)]
    raw_leaves: bool,

    /// Reference file content in place instead of copying it (needs --raw-leaves).
    #[arg(long)]
    nocopy: bool,

    /// Chunker: `size-<bytes>`, `fastcdc` or `fastcdc-<min>-<avg>-<max>`.
    #[arg(short = 's', long)]
    chunker: Option<ChunkerConfig>,

    /// Use the trickle layout.
    #[arg(short, long)]
    trickle: bool,

    /// Hash function: `sha2-256` or `blake3`.
    #[arg(long)]
    hash: Option<HashFunction>,

    /// Inline blocks up to this many bytes (at most 64) into their identifier.
    #[arg(long)]
    inline_limit: Option<usize>,

    /// Wrap the result in a directory.
    #[arg(short, long)]
    wrap: bool,

    /// Do not pin the result.
    #[arg(long)]
    no_pin: bool,

    /// Print byte progress while reading.
    #[arg(short, long)]
    progress: bool,

    /// Only print the final identifier.
    #[arg(short, long)]
    quiet: bool,
}

impl AddOptions {
    /// Apply the flags that were given on top of `config`.
    fn apply(&self, mut config: AdderConfig) -> AdderConfig {
        config.raw_leaves |= self.raw_leaves;
        config.no_copy |= self.nocopy;
        config.wrap |= self.wrap;
        config.progress |= self.progress && !self.quiet;
        if self.no_pin {
            config.pin = false;
        }
        if let Some(chunker) = self.chunker {
            config.chunker = chunker;
        }
        if self.trickle {
            config.layout = Layout::trickle();
        }
        if let Some(hash) = self.hash {
            config.hash = hash;
        }
        if self.inline_limit.is_some() {
            config.inline_limit = self.inline_limit;
        }
        config
    }
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    // CLI args override config file values.
    if let Some(dir) = cli.data_dir {
        config.node.data_dir = dir;
    }
    if cli.memory {
        config.node.backend = "memory".to_string();
    }

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Add { path, options } => {
            let repo = Repo::open(&config).await?;
            let adder_config = options.apply(config.add.clone());
            let root = cmd_add(&repo, adder_config, &path, options.quiet).await?;
            repo.save().await?;
            if options.quiet {
                println!("{root}");
            }
            Ok(())
        }
        Commands::Cat { cid } => {
            let repo = Repo::open(&config).await?;
            let data = read_file(repo.blocks.as_ref(), &cid)
                .await
                .with_context(|| format!("failed to read {cid}"))?;
            write_stdout(&data).await
        }
        Commands::Block {
            action: BlockCommands::Get { cid },
        } => {
            let repo = Repo::open(&config).await?;
            let Some(block) = repo.blocks.get(&cid).await? else {
                bail!("block not found: {cid}");
            };
            write_stdout(block.data()).await
        }
        Commands::Serve { listen_addr } => {
            if let Some(addr) = listen_addr {
                config.gateway.listen_addr = addr;
            }
            let repo = Repo::open(&config).await?;
            cmd_serve(&repo, &config.gateway.listen_addr).await
        }
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
/// Logs go to stderr so command output on stdout stays clean.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(data).await?;
    stdout.flush().await?;
    Ok(())
}

// -----------------------------------------------------------------------
// Repository
// -----------------------------------------------------------------------

/// The local block store, filestore index and pin set.
struct Repo {
    blocks: Arc<Filestore<Arc<dyn BlockStore>>>,
    pinner: Arc<MemoryPinner>,
    /// False for the memory backend.
    persistent: bool,
    index_path: PathBuf,
    pins_path: PathBuf,
}

impl Repo {
    async fn open(config: &CliConfig) -> Result<Self> {
        let inner: Arc<dyn BlockStore> = if config.memory_backend() {
            Arc::new(MemoryBlockStore::new())
        } else {
            Arc::new(
                FileBlockStore::new(config.blocks_dir())
                    .context("failed to open block store")?,
            )
        };
        let repo = Self {
            blocks: Arc::new(Filestore::new(inner)),
            pinner: Arc::new(MemoryPinner::new()),
            persistent: !config.memory_backend(),
            index_path: config.filestore_index(),
            pins_path: config.pins_file(),
        };

        if repo.persistent {
            if tokio::fs::try_exists(&repo.index_path).await? {
                repo.blocks
                    .load_index(&repo.index_path)
                    .await
                    .context("failed to load filestore index")?;
            }
            for cid in load_pins(&repo.pins_path).await? {
                repo.pinner.pin_recursive(&cid).await?;
            }
        }
        Ok(repo)
    }

    /// Persist the filestore index and pin list.
    async fn save(&self) -> Result<()> {
        if !self.persistent {
            return Ok(());
        }
        if self.blocks.reference_count() > 0 {
            self.blocks
                .save_index(&self.index_path)
                .await
                .context("failed to save filestore index")?;
        }
        let mut pins: Vec<String> = self
            .pinner
            .pins()
            .await?
            .into_iter()
            .map(|pin| pin.cid.to_string())
            .collect();
        pins.sort();
        let mut content = pins.join("\n");
        content.push('\n');
        tokio::fs::write(&self.pins_path, content)
            .await
            .context("failed to save pins")?;
        Ok(())
    }
}

/// Read a pin list: one identifier per line.
async fn load_pins(path: &Path) -> Result<Vec<Cid>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).context("failed to read pins"),
    };
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.parse::<Cid>().with_context(|| format!("bad pin entry {line:?}")))
        .collect()
}

// -----------------------------------------------------------------------
// reefd add
// -----------------------------------------------------------------------

async fn cmd_add(repo: &Repo, config: AdderConfig, path: &Path, quiet: bool) -> Result<Cid> {
    let node = FileNode::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let adder = Adder::new(config, repo.blocks.clone(), repo.pinner.clone())?;

    let cancel = CancellationToken::new();
    let on_interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling add");
                cancel.cancel();
            }
        })
    };

    let (tx, mut rx) = adder.config().event_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if quiet {
                continue;
            }
            match event.cid {
                Some(cid) if event.name.is_empty() => println!("added {cid}"),
                Some(cid) => println!("added {cid} {}", event.name),
                None => eprintln!("{}: {} bytes", event.name, event.bytes),
            }
        }
    });

    let result = adder.add_all_and_pin(node, Some(tx), &cancel).await;
    on_interrupt.abort();
    printer.await?;

    let root = result?;
    info!(%root, "added");
    Ok(root)
}

// -----------------------------------------------------------------------
// reefd serve
// -----------------------------------------------------------------------

async fn cmd_serve(repo: &Repo, addr: &str) -> Result<()> {
    let gateway = Gateway::new(repo.blocks.clone());
    gateway
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down gateway");
        })
        .await
        .with_context(|| format!("gateway failed on {addr}"))
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
