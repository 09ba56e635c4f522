//! seal: multi-recipient file encryption CLI
//!
//! Key commands:
//!   keygen --identity <id>        - generate a key pair, store the password-encrypted private key
//!   passwd --identity <id>        - re-encrypt the stored private key under a new password
//!   fingerprint <id>              - show the fingerprint of an enrolled public key
//!
//! File commands:
//!   seal <file> --to <id>...      - encrypt a file for one or more recipients
//!   open <file>... --as <id>      - decrypt envelopes (password asked once per run)
//!   inspect <file>                - show envelope header without decrypting
//!   purge                         - delete stored envelopes past their expiry
//!
//! Directory and config:
//!   directory list|import|export|remove
//!   config show

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use seal_core::config::{expand_tilde, SealConfig};
use seal_core::{FileId, Identity, SealError};
use seal_crypto::{
    codec, decrypt_private_key, EnvelopeBuilder, EnvelopeOpener, KeyCustody, PublicKey,
    SealOptions, SessionKeyCache, SystemProvider,
};
use seal_directory::KeyDirectory;
use seal_storage::SealStore;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "seal",
    version,
    about = "Encrypt files for specific recipients",
    long_about = "seal: client-side hybrid encryption of files for a set of recipients, \
                  with password-protected private keys and optional expiry"
)]
struct Cli {
    /// Path to seal config file
    #[arg(
        long,
        short = 'c',
        env = "SEAL_CONFIG",
        default_value = "~/.config/seal/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a key pair for an identity
    ///
    /// The public key is enrolled in the local directory. The private key is
    /// encrypted under a password and written to storage.
    Keygen {
        #[arg(long, short = 'i')]
        identity: String,
        /// RSA modulus size (overrides crypto.key_bits)
        #[arg(long)]
        bits: Option<usize>,
        /// Replace an existing key for this identity
        #[arg(long)]
        force: bool,
    },

    /// Change the password protecting an identity's private key
    Passwd {
        #[arg(long, short = 'i')]
        identity: String,
    },

    /// Show the fingerprint of an enrolled public key
    Fingerprint { identity: String },

    /// Encrypt a file for one or more recipients
    Seal {
        file: PathBuf,
        /// Recipient identity (repeatable)
        #[arg(long = "to", short = 't', required = true)]
        to: Vec<String>,
        /// Lifetime such as 30m, 12h, 7d or 2w (default: never expires)
        #[arg(long, value_parser = parse_duration, allow_hyphen_values = true)]
        expires_in: Option<TimeDelta>,
        #[arg(long, default_value = "application/octet-stream")]
        mime_type: String,
        /// Output path (default: <file>.seal)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// Also upload the envelope to configured storage
        #[arg(long)]
        store: bool,
    },

    /// Decrypt one or more envelopes
    ///
    /// Each argument is a local envelope file or a stored fileId.
    Open {
        #[arg(required = true)]
        files: Vec<String>,
        /// Identity to open as
        #[arg(long = "as", short = 'a')]
        identity: String,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Show an envelope's header and recipients without decrypting
    Inspect { file: PathBuf },

    /// Public-key directory management
    Directory {
        #[command(subcommand)]
        action: DirectoryAction,
    },

    /// Delete stored envelopes whose expiry has passed
    Purge,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum DirectoryAction {
    /// List enrolled identities
    List,
    /// Enroll a public key (file path, PEM, or base64 SPKI)
    Import { identity: String, key: String },
    /// Print an enrolled public key as base64 SPKI
    Export { identity: String },
    /// Remove an identity
    Remove { identity: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = SealConfig::load(&config_path).map_err(user_error)?;
    init_logging(&config.log.level, &config.log.format);

    match cli.command {
        Commands::Keygen {
            identity,
            bits,
            force,
        } => cmd_keygen(&config, &identity, bits, force).await,
        Commands::Passwd { identity } => cmd_passwd(&config, &identity).await,
        Commands::Fingerprint { identity } => cmd_fingerprint(&config, &identity),
        Commands::Seal {
            file,
            to,
            expires_in,
            mime_type,
            out,
            store,
        } => cmd_seal(&config, &file, &to, expires_in, &mime_type, out, store).await,
        Commands::Open {
            files,
            identity,
            out_dir,
        } => cmd_open(&config, &files, &identity, &out_dir).await,
        Commands::Inspect { file } => cmd_inspect(&file).await,
        Commands::Directory { action } => cmd_directory(&config, action),
        Commands::Purge => cmd_purge(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Surface a library error with its user-facing text, so wrong-key,
/// wrong-password and corruption failures all read the same.
fn user_error(e: SealError) -> anyhow::Error {
    anyhow::anyhow!(e.user_message())
}

fn open_store(config: &SealConfig) -> Result<SealStore> {
    let op = seal_storage::build_from_config(&config.storage).context("building storage operator")?;
    Ok(SealStore::new(op, &config.storage.prefix))
}

fn directory_path(config: &SealConfig) -> PathBuf {
    expand_tilde(&config.directory.path)
}

fn custody(config: &SealConfig) -> Result<KeyCustody> {
    KeyCustody::with_iterations(SystemProvider, config.crypto.kdf_iterations).map_err(user_error)
}

fn prompt_password(prompt: &str) -> Result<SecretString> {
    let pw = rpassword::prompt_password(prompt).context("reading password")?;
    Ok(SecretString::from(pw))
}

fn prompt_new_password() -> Result<SecretString> {
    let first = prompt_password("New password: ")?;
    if first.expose_secret().is_empty() {
        anyhow::bail!("password must not be empty");
    }
    let second = prompt_password("Repeat password: ")?;
    if first.expose_secret() != second.expose_secret() {
        anyhow::bail!("passwords do not match");
    }
    Ok(first)
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Parse a lifetime like `30m`, `12h`, `7d`, `2w`. A bare number is days;
/// a leading `-` gives a lifetime already in the past.
fn parse_duration(s: &str) -> std::result::Result<TimeDelta, String> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let split = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let (digits, unit) = body.split_at(split);
    let n: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {s:?}: expected e.g. 30m, 12h, 7d"))?;

    let delta = match unit {
        "s" => TimeDelta::try_seconds(n),
        "m" => TimeDelta::try_minutes(n),
        "h" => TimeDelta::try_hours(n),
        "" | "d" => TimeDelta::try_days(n),
        "w" => TimeDelta::try_weeks(n),
        other => return Err(format!("unknown duration unit {other:?} (use s, m, h, d or w)")),
    }
    .ok_or_else(|| format!("duration {s:?} is out of range"))?;

    Ok(if negative { -delta } else { delta })
}

/// Reduce an envelope's stored filename to a bare file name.
fn output_name(filename: &str, file_id: &FileId) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{file_id}.bin"))
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

// ── `seal keygen` ─────────────────────────────────────────────────────────────

async fn cmd_keygen(
    config: &SealConfig,
    identity: &str,
    bits: Option<usize>,
    force: bool,
) -> Result<()> {
    let identity = Identity::new(identity).map_err(user_error)?;
    let store = open_store(config)?;

    if !force && store.get_key_blob(&identity).await.map_err(user_error)?.is_some() {
        anyhow::bail!("a key already exists for {identity}; pass --force to replace it");
    }

    let password = prompt_new_password()?;
    let bits = bits.unwrap_or(config.crypto.key_bits);
    let custody = custody(config)?;

    let pb = make_spinner("keygen");
    pb.set_message(format!("generating {bits}-bit RSA key pair"));
    let (public, blob) = tokio::task::spawn_blocking(move || {
        let pair = custody.generate_key_pair(bits)?;
        let blob = custody.encrypt_private_key(&pair.private, &password)?;
        Ok::<_, SealError>((pair.public, blob))
    })
    .await
    .context("key generation task")?
    .map_err(user_error)?;
    pb.finish_and_clear();

    store
        .put_key_blob(&identity, &blob)
        .await
        .map_err(user_error)?;

    let dir_path = directory_path(config);
    let mut directory = KeyDirectory::load(&dir_path)?;
    let fingerprint = directory
        .enroll(identity.as_str(), &public)
        .map_err(user_error)?;
    directory.save(&dir_path)?;

    println!("Generated {bits}-bit key for {identity}");
    println!("  fingerprint: {fingerprint}");
    println!("  directory:   {}", dir_path.display());
    Ok(())
}

// ── `seal passwd` ─────────────────────────────────────────────────────────────

async fn cmd_passwd(config: &SealConfig, identity: &str) -> Result<()> {
    let identity = Identity::new(identity).map_err(user_error)?;
    let store = open_store(config)?;
    let blob = store
        .get_key_blob(&identity)
        .await
        .map_err(user_error)?
        .with_context(|| format!("no stored key for {identity}; run `seal keygen` first"))?;

    let old = prompt_password(&format!("Current password for {identity}: "))?;
    let new = prompt_new_password()?;
    let custody = custody(config)?;

    let pb = make_spinner("passwd");
    pb.set_message("re-encrypting private key");
    let rotated = tokio::task::spawn_blocking(move || custody.change_password(&blob, &old, &new))
        .await
        .context("password change task")?
        .map_err(user_error)?;
    pb.finish_and_clear();

    store
        .put_key_blob(&identity, &rotated)
        .await
        .map_err(user_error)?;
    println!("Password changed for {identity}");
    Ok(())
}

// ── `seal fingerprint` ────────────────────────────────────────────────────────

fn cmd_fingerprint(config: &SealConfig, identity: &str) -> Result<()> {
    let directory = KeyDirectory::load(&directory_path(config))?;
    let entry = directory
        .find(identity)
        .with_context(|| format!("{identity} is not in the directory"))?;

    let actual = entry
        .public_key()
        .and_then(|k| k.fingerprint())
        .map_err(user_error)?;
    if actual != entry.fingerprint {
        tracing::warn!(
            identity = %entry.identity,
            recorded = %entry.fingerprint,
            actual = %actual,
            "recorded fingerprint does not match stored key"
        );
    }

    println!("{}  {}", actual, entry.identity);
    Ok(())
}

// ── `seal seal` ───────────────────────────────────────────────────────────────

async fn cmd_seal(
    config: &SealConfig,
    file: &Path,
    to: &[String],
    expires_in: Option<TimeDelta>,
    mime_type: &str,
    out: Option<PathBuf>,
    store: bool,
) -> Result<()> {
    let plaintext = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let directory = KeyDirectory::load(&directory_path(config))?;

    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut options = SealOptions::new(filename, mime_type);
    options.expires_in = expires_in;

    let builder = EnvelopeBuilder::new(SystemProvider).with_parallel(config.crypto.parallel_wrap);
    let envelope = builder
        .seal_for(&plaintext, to, &directory, &options)
        .map_err(user_error)?;
    let bytes = codec::encode(&envelope).map_err(user_error)?;

    let out = out.unwrap_or_else(|| {
        let mut name = file.as_os_str().to_owned();
        name.push(".seal");
        PathBuf::from(name)
    });
    tokio::fs::write(&out, &bytes)
        .await
        .with_context(|| format!("writing {}", out.display()))?;

    println!("Sealed {} → {}", file.display(), out.display());
    println!("  file id:    {}", envelope.file_id);
    println!("  recipients: {}", envelope.recipients.len());
    println!("  size:       {}", fmt_bytes(envelope.metadata.size));
    if let Some(at) = envelope.metadata.expires_at {
        println!("  expires:    {}", codec::format_timestamp(&at));
    }

    if store {
        open_store(config)?
            .put_envelope(&envelope)
            .await
            .map_err(user_error)?;
        println!("  stored:     yes");
    }
    Ok(())
}

// ── `seal open` ───────────────────────────────────────────────────────────────

async fn cmd_open(
    config: &SealConfig,
    files: &[String],
    identity: &str,
    out_dir: &Path,
) -> Result<()> {
    let identity = Identity::new(identity).map_err(user_error)?;
    let store = open_store(config)?;
    let blob = store
        .get_key_blob(&identity)
        .await
        .map_err(user_error)?
        .with_context(|| format!("no stored key for {identity}"))?;

    let password = prompt_password(&format!("Password for {identity}: "))?;
    let pb = make_spinner("unlock");
    pb.set_message("deriving key");
    let private = tokio::task::spawn_blocking(move || decrypt_private_key(&blob, &password))
        .await
        .context("unlock task")?
        .map_err(user_error)?;
    pb.finish_and_clear();

    let session = match config.session.idle_timeout_secs {
        Some(secs) => SessionKeyCache::with_idle_timeout(Duration::from_secs(secs)),
        None => SessionKeyCache::new(),
    };
    session
        .unlock(private, identity.as_str())
        .map_err(user_error)?;

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let opener = EnvelopeOpener::default();
    let mut failures = 0usize;
    for source in files {
        match open_one(&store, &opener, &session, &identity, source, out_dir).await {
            Ok(path) => println!("  {source} → {}", path.display()),
            Err(e) => {
                failures += 1;
                eprintln!("  {source}: {e:#}");
            }
        }
    }
    session.clear();

    if failures > 0 {
        anyhow::bail!("{failures} of {} files could not be opened", files.len());
    }
    Ok(())
}

async fn open_one(
    store: &SealStore,
    opener: &EnvelopeOpener,
    session: &SessionKeyCache,
    identity: &Identity,
    source: &str,
    out_dir: &Path,
) -> Result<PathBuf> {
    let bytes = load_envelope_bytes(store, source).await?;
    let envelope = codec::decode(&bytes).map_err(user_error)?;
    let opened = session
        .with_key(|key| opener.open_envelope(&envelope, identity.as_str(), key.private_key()))
        .context("session key expired; run the command again")?
        .map_err(user_error)?;

    let path = out_dir.join(output_name(&opened.metadata.filename, &envelope.file_id));
    if path.exists() {
        tracing::warn!(path = %path.display(), "overwriting existing file");
    }
    tokio::fs::write(&path, &opened.plaintext)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// A local path if one exists, otherwise a fileId in storage.
async fn load_envelope_bytes(store: &SealStore, source: &str) -> Result<Vec<u8>> {
    let path = Path::new(source);
    if path.exists() {
        return tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()));
    }
    let file_id = FileId::from_hex(source)
        .with_context(|| format!("{source} is neither a file nor a file id"))?;
    store
        .get_envelope_bytes(&file_id)
        .await
        .map_err(user_error)?
        .with_context(|| format!("no stored envelope {file_id}"))
}

// ── `seal inspect` ────────────────────────────────────────────────────────────

async fn cmd_inspect(file: &Path) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let envelope = codec::decode(&bytes).map_err(user_error)?;
    let summary = codec::inspect(&envelope);
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("formatting summary")?
    );
    if envelope.is_expired(Utc::now()) {
        println!("(expired)");
    }
    Ok(())
}

// ── `seal directory` ──────────────────────────────────────────────────────────

fn cmd_directory(config: &SealConfig, action: DirectoryAction) -> Result<()> {
    let dir_path = directory_path(config);
    let mut directory = KeyDirectory::load(&dir_path)?;

    match action {
        DirectoryAction::List => {
            if directory.entries.is_empty() {
                println!("(no enrolled keys in {})", dir_path.display());
            }
            for entry in &directory.entries {
                println!(
                    "{:<32} {}  {}",
                    entry.identity,
                    entry.fingerprint,
                    entry.enrolled_at.format("%Y-%m-%d")
                );
            }
        }
        DirectoryAction::Import { identity, key } => {
            let text = if Path::new(&key).exists() {
                std::fs::read_to_string(&key).with_context(|| format!("reading {key}"))?
            } else {
                key
            };
            let fingerprint = if text.trim_start().starts_with("-----BEGIN") {
                let public = PublicKey::from_pem(&text).map_err(user_error)?;
                directory.enroll(&identity, &public)
            } else {
                directory.import(&identity, &text)
            }
            .map_err(user_error)?;
            directory.save(&dir_path)?;
            println!("Enrolled {identity} ({fingerprint})");
        }
        DirectoryAction::Export { identity } => {
            let entry = directory
                .find(&identity)
                .with_context(|| format!("{identity} is not in the directory"))?;
            println!("{}", entry.public_key);
        }
        DirectoryAction::Remove { identity } => {
            if !directory.remove(&identity) {
                anyhow::bail!("{identity} is not in the directory");
            }
            directory.save(&dir_path)?;
            println!("Removed {identity}");
        }
    }
    Ok(())
}

// ── `seal purge` ──────────────────────────────────────────────────────────────

async fn cmd_purge(config: &SealConfig) -> Result<()> {
    let store = open_store(config)?;
    let report = store.purge_expired(Utc::now()).await.map_err(user_error)?;

    for file_id in &report.removed {
        println!("  removed {file_id}");
    }
    println!(
        "Purge complete: {} removed, {} kept, {} unreadable",
        report.removed.len(),
        report.kept,
        report.unreadable
    );
    Ok(())
}

// ── `seal config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &SealConfig, path: &Path) -> Result<()> {
    println!("# config: {}", path.display());
    println!(
        "{}",
        toml::to_string_pretty(config).context("serializing config")?
    );
    Ok(())
}
