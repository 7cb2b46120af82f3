//! veilfs: encrypted storage overlay CLI
//!
//! Every payload written through this tool is sealed into tokens before it
//! reaches the configured backend; every payload read back is
//! authenticated first.
//!
//! Commands:
//!   keygen                         - print a fresh overlay key
//!   put <remote> [--input FILE]    - encrypt stdin/FILE into <remote>
//!   get <remote> [--output FILE]   - decrypt <remote> to stdout/FILE
//!   ls, mkdir, rm, rmdir, stat, desc, cp, mv
//!   health                         - check the backend is reachable
//!   config show                    - print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use veilfs_core::config::VeilConfig;
use veilfs_crypto::OverlayKey;
use veilfs_overlay::{EncryptingOverlay, OverlayOptions};
use veilfs_storage::{Backend, S3Credentials};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "veilfs",
    version,
    about = "Transparent encryption overlay for path-addressed storage"
)]
struct Cli {
    /// Path to veilfs.toml configuration file
    #[arg(long, short = 'c', env = "VEILFS_CONFIG", default_value = "veilfs.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "VEILFS_LOG")]
    log: Option<String>,

    /// Log format; overrides config
    #[arg(long, env = "VEILFS_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Overlay key (base64); takes precedence over key_file and key_env
    #[arg(long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new random overlay key
    Keygen,

    /// Encrypt data into a remote object
    Put {
        /// Remote path
        remote: String,
        /// Read plaintext from this file instead of stdin
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
        /// Append to the object instead of replacing it
        #[arg(long, short = 'a')]
        append: bool,
        /// Plaintext bytes per token (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Decrypt a remote object
    Get {
        /// Remote path
        remote: String,
        /// Write plaintext to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List a directory
    Ls {
        /// Remote directory (default: root)
        #[arg(default_value = "/")]
        dir: String,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a directory
    Mkdir {
        dir: String,
        /// Create missing parents; succeed if it already exists
        #[arg(long, short = 'p')]
        parents: bool,
    },

    /// Remove a file
    Rm { path: String },

    /// Remove an empty directory
    Rmdir { dir: String },

    /// Show backend metadata for a path
    Stat {
        path: String,
        /// Also decrypt the object to report its plaintext size
        #[arg(long)]
        plaintext: bool,
    },

    /// Describe where a path lives on the backend
    Desc { path: String },

    /// Copy a file (ciphertext is copied as-is)
    Cp {
        src: String,
        dst: String,
        /// Replace an existing destination
        #[arg(long, short = 'f')]
        force: bool,
        /// Copy a directory tree, creating the destination as needed
        #[arg(long, short = 'r')]
        recursive: bool,
    },

    /// Move a file
    Mv {
        src: String,
        dst: String,
        /// Replace an existing destination
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Check that the storage backend is reachable
    Health,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

type Overlay = EncryptingOverlay<Box<dyn Backend>>;

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = VeilConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        backend = ?config.storage.backend,
        "veilfs starting"
    );

    match cli.command {
        Commands::Keygen => cmd_keygen(),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Health => cmd_health(&config),
        command => {
            let fs = open_overlay(&config, cli.key)?;
            run(&fs, command)
        }
    }
}

fn run(fs: &Overlay, command: Commands) -> Result<()> {
    match command {
        Commands::Put { remote, input, append, chunk_size } => {
            cmd_put(fs, &remote, input.as_deref(), append, chunk_size)
        }
        Commands::Get { remote, output } => cmd_get(fs, &remote, output.as_deref()),
        Commands::Ls { dir, json } => cmd_ls(fs, &dir, json),
        Commands::Mkdir { dir, parents } => {
            let result = if parents {
                fs.make_dirs(&dir)
            } else {
                fs.make_dir(&dir, false)
            };
            result.with_context(|| format!("creating directory {dir}"))
        }
        Commands::Rm { path } => fs.remove(&path).with_context(|| format!("removing {path}")),
        Commands::Rmdir { dir } => fs
            .remove_dir(&dir)
            .with_context(|| format!("removing directory {dir}")),
        Commands::Stat { path, plaintext } => cmd_stat(fs, &path, plaintext),
        Commands::Desc { path } => {
            println!("{}", fs.describe(&path)?);
            Ok(())
        }
        Commands::Cp { src, dst, force, recursive } => {
            let result = if recursive {
                fs.copy_dir(&src, &dst, true)
            } else {
                fs.copy(&src, &dst, force)
            };
            result.with_context(|| format!("copying {src} to {dst}"))
        }
        Commands::Mv { src, dst, force } => fs
            .move_file(&src, &dst, force)
            .with_context(|| format!("moving {src} to {dst}")),
        Commands::Keygen | Commands::Health | Commands::Config { .. } => {
            anyhow::bail!("command does not operate on an overlay")
        }
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so `get` can stream plaintext on stdout.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Overlay construction ──────────────────────────────────────────────────────

fn open_backend(config: &VeilConfig) -> Result<Box<dyn Backend>> {
    let creds = S3Credentials::from_env();
    veilfs_storage::open_backend(&config.storage, creds.as_ref()).context("opening storage backend")
}

fn open_overlay(config: &VeilConfig, key: Option<String>) -> Result<Overlay> {
    let explicit = key.map(SecretString::from);
    // Resolve the key before touching storage so a bad key fails fast.
    let options = OverlayOptions::from_config(&config.overlay, explicit.as_ref())
        .context("resolving overlay key")?;
    let backend = open_backend(config)?;
    Ok(EncryptingOverlay::with_options(backend, options)?)
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn cmd_keygen() -> Result<()> {
    let key = OverlayKey::generate();
    println!("{}", key.to_encoded().expose_secret());
    Ok(())
}

fn cmd_put(
    fs: &Overlay,
    remote: &str,
    input: Option<&Path>,
    append: bool,
    chunk_size: Option<usize>,
) -> Result<()> {
    let data = match input {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let chunk_size = chunk_size.unwrap_or(fs.chunk_size());
    if append {
        fs.append_chunked(remote, &data, chunk_size)
            .with_context(|| format!("appending to {remote}"))?;
    } else {
        fs.write_chunked(remote, &data, chunk_size)
            .with_context(|| format!("writing {remote}"))?;
    }
    tracing::info!(remote, bytes = data.len(), append, "stored encrypted");
    Ok(())
}

fn cmd_get(fs: &Overlay, remote: &str, output: Option<&Path>) -> Result<()> {
    let data = fs
        .read_bytes(remote)
        .with_context(|| format!("reading {remote}"))?;
    match output {
        Some(path) => {
            std::fs::write(path, &data).with_context(|| format!("writing {}", path.display()))?
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn cmd_ls(fs: &Overlay, dir: &str, json: bool) -> Result<()> {
    let names = fs
        .list_dir(dir)
        .with_context(|| format!("listing {dir}"))?;
    let base = dir.trim_end_matches('/');
    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        entries.push(fs.stat(&format!("{base}/{name}"))?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in entries {
        if entry.is_dir {
            println!("{:>12}  {}/", "-", entry.name);
        } else {
            println!("{:>12}  {}", entry.size, entry.name);
        }
    }
    Ok(())
}

fn cmd_stat(fs: &Overlay, path: &str, plaintext: bool) -> Result<()> {
    let info = fs.stat(path).with_context(|| format!("stat {path}"))?;
    let mut value = serde_json::to_value(&info)?;
    if plaintext && !info.is_dir {
        value["plaintext_size"] = fs.plaintext_len(path)?.into();
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn cmd_health(config: &VeilConfig) -> Result<()> {
    let backend = open_backend(config)?;
    veilfs_storage::check_health(backend.as_ref())?;
    println!("ok: {:?} backend reachable", config.storage.backend);
    Ok(())
}

fn cmd_config_show(config: &VeilConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
