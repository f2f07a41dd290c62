//! fileenc: FileEncrypter command-line interface
//!
//! Commands:
//!   encrypt <file>                  - password container (or --cert for a certificate)
//!   decrypt <file>                  - restore with password, recovery phrase or certificate
//!   inspect <file>                  - show container kind and clear-text header
//!   phrase validate|format          - recovery phrase helpers
//!   password generate|strength      - password helpers
//!   cert generate|list              - self-signed certificates as JSON files

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use zeroize::Zeroizing;

use fileenc_crypto_core::{
    evaluate_strength, format_for_display, generate_random_password, Certificate, CharsetConfig,
    RecoveryPhrase, DEFAULT_PASSWORD_LENGTH,
};
use fileenc_engine::envelope::legacy::{self, LegacyPkiFile, MAX_LEGACY_FILE_LEN};
use fileenc_engine::{
    container, encrypted_file_name, envelope, wire, CancellationSource, CancellationToken,
    CertificateProvider, EncryptedKind, EngineConfig, EngineError, ErrorKind,
    InMemoryCertificateStore, Monitor, PkiFormat, Secret,
};

/// Subdirectory of the config dir searched for certificates.
const CERTIFICATE_DIR: &str = "certificates";

/// Exit status after an interrupted operation (128 + SIGINT).
const EXIT_CANCELLED: i32 = 130;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "fileenc",
    version,
    about = "Encrypt files with a password, recovery phrase or certificate"
)]
struct Cli {
    /// Directory holding engine.json and certificates/ (default: platform config dir)
    #[arg(long, global = true, env = "FILEENC_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Log engine state transitions to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file
    ///
    /// Without --cert the file is protected by a password and a recovery
    /// phrase is printed once. Keep it: it is the only way back in if the
    /// password is lost.
    Encrypt {
        /// File to encrypt
        file: PathBuf,
        /// Encrypt for this certificate (JSON file) instead of a password
        #[arg(long)]
        cert: Option<PathBuf>,
        /// Output path (default: next to the input with .enc or .pki appended)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Name the output after a hash of the input name
        #[arg(long)]
        hashed_name: bool,
        /// Password (prompted when not given)
        #[arg(long, env = "FILEENC_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Decrypt a file into a directory
    Decrypt {
        /// Encrypted file
        file: PathBuf,
        /// Use the recovery phrase instead of the password
        #[arg(long, conflicts_with_all = ["cert", "cert_dir"])]
        recovery: bool,
        /// Certificate JSON file with private key
        #[arg(long, conflicts_with = "cert_dir")]
        cert: Option<PathBuf>,
        /// Directory of certificate JSON files; the recipient is looked up
        /// by thumbprint
        #[arg(long)]
        cert_dir: Option<PathBuf>,
        /// Output directory (default: the input's directory)
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        /// Delete the encrypted file after a successful decrypt
        #[arg(long)]
        delete_source: bool,
        /// Password (prompted when not given)
        #[arg(long, env = "FILEENC_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Recovery phrase (prompted when not given)
        #[arg(long, env = "FILEENC_RECOVERY_PHRASE", hide_env_values = true)]
        phrase: Option<String>,
    },

    /// Show the container kind and clear-text header of a file
    Inspect {
        /// Encrypted file
        file: PathBuf,
    },

    /// Recovery phrase helpers
    Phrase {
        #[command(subcommand)]
        action: PhraseAction,
    },

    /// Password helpers
    Password {
        #[command(subcommand)]
        action: PasswordAction,
    },

    /// Certificate management
    Cert {
        #[command(subcommand)]
        action: CertAction,
    },
}

#[derive(Subcommand, Debug)]
enum PhraseAction {
    /// Check that a phrase has twelve words from the word list
    Validate {
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
    /// Print a phrase as three numbered lines of four words
    Format {
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PasswordAction {
    /// Generate a random password
    Generate {
        #[arg(long, short = 'l', default_value_t = DEFAULT_PASSWORD_LENGTH)]
        length: usize,
        #[arg(long)]
        no_upper: bool,
        #[arg(long)]
        no_lower: bool,
        #[arg(long)]
        no_digits: bool,
        #[arg(long)]
        no_symbols: bool,
    },
    /// Score a password (prompted when not given)
    Strength { password: Option<String> },
}

#[derive(Subcommand, Debug)]
enum CertAction {
    /// Generate a self-signed RSA certificate
    Generate {
        /// Subject, e.g. "CN=Alice"
        #[arg(long)]
        subject: String,
        /// RSA key size: 2048, 3072 or 4096
        #[arg(long, default_value_t = 2048)]
        bits: usize,
        /// Validity in years
        #[arg(long, default_value_t = 5)]
        years: u32,
        /// Output file with the private key
        #[arg(long)]
        out: PathBuf,
        /// Optional public-only copy to hand to senders
        #[arg(long)]
        public_out: Option<PathBuf>,
    },
    /// List valid certificates in a directory (default: <config>/certificates)
    List { dir: Option<PathBuf> },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_dir = resolve_config_dir(cli.config_dir.as_deref());
    let config = config_dir
        .as_deref()
        .map_or_else(EngineConfig::default, EngineConfig::load);
    tracing::debug!(?config_dir, ?config, "configuration loaded");

    let result = match cli.command {
        Commands::Encrypt { file, cert, output, hashed_name, password } => cmd_encrypt(
            &config,
            &file,
            cert.as_deref(),
            output.as_deref(),
            hashed_name,
            password,
        ),
        Commands::Decrypt {
            file,
            recovery,
            cert,
            cert_dir,
            output_dir,
            delete_source,
            password,
            phrase,
        } => {
            let credentials = if recovery {
                Credentials::RecoveryPhrase(phrase)
            } else if let Some(path) = cert {
                Credentials::Certificate(path)
            } else if let Some(dir) =
                cert_dir.or_else(|| default_cert_dir(&file, config_dir.as_deref()))
            {
                Credentials::CertificateDir(dir)
            } else {
                Credentials::Password(password)
            };
            let config = EngineConfig {
                delete_source: config.delete_source || delete_source,
                ..config
            };
            cmd_decrypt(&config, &file, output_dir.as_deref(), credentials)
        }
        Commands::Inspect { file } => cmd_inspect(&file),
        Commands::Phrase { action } => cmd_phrase(action),
        Commands::Password { action } => cmd_password(action),
        Commands::Cert {
            action: CertAction::Generate { subject, bits, years, out, public_out },
        } => cmd_cert_generate(&subject, bits, years, &out, public_out.as_deref()),
        Commands::Cert { action: CertAction::List { dir } } => {
            let dir = dir
                .or_else(|| config_dir.map(|d| d.join(CERTIFICATE_DIR)))
                .context("no certificate directory given and no config directory available")?;
            cmd_cert_list(&dir)
        }
    };

    if let Err(err) = &result {
        if is_cancelled(err) {
            eprintln!("cancelled");
            std::process::exit(EXIT_CANCELLED);
        }
    }
    result
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "fileenc=debug" } else { "fileenc=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Config and paths ──────────────────────────────────────────────────────────

/// `--config-dir` > `FILEENC_CONFIG_DIR` > `{platform config dir}/fileenc`
fn resolve_config_dir(override_dir: Option<&Path>) -> Option<PathBuf> {
    override_dir
        .map(Path::to_path_buf)
        .or_else(|| dirs::config_dir().map(|d| d.join("fileenc")))
}

/// Certificate containers without explicit credentials are matched against
/// `{config}/certificates` when it exists.
fn default_cert_dir(file: &Path, config_dir: Option<&Path>) -> Option<PathBuf> {
    let is_pki = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EncryptedKind::Certificate.extension()));
    let dir = config_dir?.join(CERTIFICATE_DIR);
    (is_pki && dir.is_dir()).then_some(dir)
}

fn parent_dir(file: &Path) -> PathBuf {
    file.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn default_encrypted_path(file: &Path, name: &str, kind: EncryptedKind, hashed: bool) -> PathBuf {
    let file_name = if hashed {
        encrypted_file_name(name, kind)
    } else {
        format!("{name}.{}", kind.extension())
    };
    parent_dir(file).join(file_name)
}

fn load_certificate(path: &Path) -> Result<Certificate> {
    let json = Zeroizing::new(
        fs::read_to_string(path)
            .with_context(|| format!("reading certificate: {}", path.display()))?,
    );
    Certificate::import_json(&json)
        .with_context(|| format!("parsing certificate: {}", path.display()))
}

/// Create `path`, refusing to overwrite. Private files are owner-only on Unix.
fn write_new(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(contents)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

// ── Secrets ───────────────────────────────────────────────────────────────────

enum Credentials {
    Password(Option<String>),
    RecoveryPhrase(Option<String>),
    Certificate(PathBuf),
    CertificateDir(PathBuf),
}

fn read_password(provided: Option<String>, confirm: bool) -> Result<Zeroizing<String>> {
    if let Some(password) = provided {
        return Ok(Zeroizing::new(password));
    }
    let password =
        Zeroizing::new(rpassword::prompt_password("Password: ").context("reading password")?);
    if confirm {
        let again = Zeroizing::new(
            rpassword::prompt_password("Confirm password: ").context("reading password")?,
        );
        if *password != *again {
            bail!("passwords do not match");
        }
    }
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(password)
}

fn read_phrase(provided: Option<String>) -> Result<Zeroizing<String>> {
    match provided {
        Some(phrase) => Ok(Zeroizing::new(phrase)),
        None => Ok(Zeroizing::new(
            rpassword::prompt_password("Recovery phrase: ").context("reading recovery phrase")?,
        )),
    }
}

// ── Progress and errors ───────────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}%")
            .context("progress bar template")?
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// First Ctrl-C cancels the running operation so partial output is removed;
/// a second one exits immediately.
fn cancel_on_ctrl_c() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(EXIT_CANCELLED);
        }
        handler_token.cancel();
    })
    .context("installing Ctrl-C handler")?;
    Ok(token)
}

/// Run an engine call with a progress bar on stderr, cancellable by Ctrl-C.
fn with_progress<T>(
    prefix: &str,
    op: impl FnOnce(&Monitor<'_>) -> Result<T, EngineError>,
) -> Result<T> {
    let token = cancel_on_ctrl_c()?;
    run_monitored(prefix, &token, op)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn run_monitored<T>(
    prefix: &str,
    cancel: &CancellationToken,
    op: impl FnOnce(&Monitor<'_>) -> Result<T, EngineError>,
) -> Result<T> {
    let pb = make_progress_bar(prefix)?;
    let sink = |percent: f64| pb.set_position(percent.round() as u64);
    let result = op(&Monitor::new(&sink, cancel));
    if result.is_ok() {
        pb.finish_and_clear();
    } else {
        pb.abandon();
    }
    result.map_err(describe)
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<EngineError>()
        .is_some_and(EngineError::is_cancelled)
}

/// Attach a user-facing hint based on the error kind.
fn describe(err: EngineError) -> anyhow::Error {
    let hint = match &err {
        EngineError::NoRecoveryPhrase => {
            Some("this file predates recovery phrases; decrypt it with its password")
        }
        EngineError::WrongCertificate { .. } => {
            Some("the file was encrypted for a different certificate")
        }
        _ => match err.kind() {
            ErrorKind::Authentication => {
                Some("check the password, recovery phrase or certificate")
            }
            ErrorKind::Format => Some("the file is not a FileEncrypter container or is damaged"),
            ErrorKind::Validation | ErrorKind::Cancelled | ErrorKind::Io => None,
        },
    };
    let err = anyhow::Error::new(err);
    match hint {
        Some(hint) => err.context(hint),
        None => err,
    }
}

// ── `fileenc encrypt` ─────────────────────────────────────────────────────────

fn cmd_encrypt(
    config: &EngineConfig,
    file: &Path,
    cert: Option<&Path>,
    output: Option<&Path>,
    hashed_name: bool,
    password: Option<String>,
) -> Result<()> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", file.display()))?;
    let kind = if cert.is_some() {
        EncryptedKind::Certificate
    } else {
        EncryptedKind::Password
    };
    let output = output.map_or_else(
        || default_encrypted_path(file, name, kind, hashed_name),
        Path::to_path_buf,
    );

    if let Some(cert_path) = cert {
        let certificate = load_certificate(cert_path)?;
        let header = with_progress("encrypt", |monitor| {
            envelope::encrypt_file(file, &output, &certificate, config, monitor)
        })?;
        println!("Encrypted {name} -> {}", output.display());
        println!(
            "Recipient: {} ({})",
            certificate.info().subject,
            header.thumbprint
        );
        return Ok(());
    }

    let password = read_password(password, true)?;
    let phrase = with_progress("encrypt", |monitor| {
        container::encrypt_file(file, &output, &password, config, monitor)
    })?;
    println!("Encrypted {name} -> {}", output.display());
    println!();
    println!("Recovery phrase (shown once, store it somewhere safe):");
    println!("{}", phrase.format_for_display());
    Ok(())
}

// ── `fileenc decrypt` ─────────────────────────────────────────────────────────

fn cmd_decrypt(
    config: &EngineConfig,
    file: &Path,
    output_dir: Option<&Path>,
    credentials: Credentials,
) -> Result<()> {
    let output_dir = output_dir.map_or_else(|| parent_dir(file), Path::to_path_buf);

    let restored = match credentials {
        Credentials::Password(password) => {
            let password = read_password(password, false)?;
            with_progress("decrypt", |monitor| {
                container::decrypt_file(
                    file,
                    &output_dir,
                    &Secret::Password(&password),
                    config,
                    monitor,
                )
            })?
        }
        Credentials::RecoveryPhrase(phrase) => {
            let phrase = read_phrase(phrase)?;
            with_progress("decrypt", |monitor| {
                container::decrypt_file(
                    file,
                    &output_dir,
                    &Secret::RecoveryPhrase(&phrase),
                    config,
                    monitor,
                )
            })?
        }
        Credentials::Certificate(path) => {
            let certificate = load_certificate(&path)?;
            with_progress("decrypt", |monitor| {
                envelope::decrypt_file(file, &output_dir, &certificate, config, monitor)
            })?
        }
        Credentials::CertificateDir(dir) => {
            let store = InMemoryCertificateStore::from_dir(&dir)
                .map_err(describe)
                .with_context(|| format!("loading certificates from {}", dir.display()))?;
            tracing::debug!(count = store.len(), "certificates loaded");
            with_progress("decrypt", |monitor| {
                envelope::decrypt_file_with_provider(file, &output_dir, &store, config, monitor)
            })?
        }
    };

    println!("Decrypted -> {}", restored.display());
    if config.delete_source && !file.exists() {
        println!("Removed {}", file.display());
    }
    Ok(())
}

// ── `fileenc inspect` ─────────────────────────────────────────────────────────

fn cmd_inspect(file: &Path) -> Result<()> {
    let mut input = BufReader::new(
        File::open(file).with_context(|| format!("opening {}", file.display()))?,
    );
    let prefix = wire::read_prefix(&mut input, envelope::SIGNATURE.len())?;

    if prefix.starts_with(container::SIGNATURE) {
        println!("kind:      password container (FENC_v2)");
        println!("recovery:  supported");
        return Ok(());
    }

    match envelope::detect_format(&prefix) {
        PkiFormat::StreamingV2 => {
            let header =
                envelope::read_header(&mut Cursor::new(prefix).chain(input)).map_err(describe)?;
            println!("kind:      certificate container (FILEENC_PKI_V2)");
            println!("file name: {}", header.file_name);
            println!("size:      {} bytes", header.original_size);
            println!("recipient: {}", header.thumbprint);
            println!("encrypted: {}", header.encrypted_at);
        }
        PkiFormat::LegacyWrapped => {
            let mut bytes = prefix;
            input.read_to_end(&mut bytes)?;
            let document = LegacyPkiFile::from_bytes(&bytes).map_err(describe)?;
            println!("kind:      legacy certificate file (FILEENC_PKI_V1)");
            println!("file name: {}", document.original_file_name);
            println!("recipient: {}", document.certificate_thumbprint);
            if !document.encrypted_date.is_empty() {
                println!("encrypted: {}", document.encrypted_date);
            }
        }
        PkiFormat::LegacyEnvelope => {
            let thumbprint = if fs::metadata(file)?.len() <= MAX_LEGACY_FILE_LEN {
                let mut bytes = prefix;
                input.read_to_end(&mut bytes)?;
                legacy::thumbprint_of_file(&bytes).ok()
            } else {
                None
            };
            match thumbprint {
                Some(thumbprint) => {
                    println!("kind:      legacy certificate envelope (Base64)");
                    println!("recipient: {thumbprint}");
                }
                None => {
                    println!("kind:      legacy password container (no signature)");
                    println!("recovery:  not supported");
                }
            }
        }
    }
    Ok(())
}

// ── `fileenc phrase` ──────────────────────────────────────────────────────────

fn cmd_phrase(action: PhraseAction) -> Result<()> {
    match action {
        PhraseAction::Validate { words } => {
            let phrase = Zeroizing::new(words.join(" "));
            RecoveryPhrase::parse(&phrase).context("invalid recovery phrase")?;
            println!("valid");
        }
        PhraseAction::Format { words } => {
            println!("{}", format_for_display(&words.join(" ")));
        }
    }
    Ok(())
}

// ── `fileenc password` ────────────────────────────────────────────────────────

fn cmd_password(action: PasswordAction) -> Result<()> {
    match action {
        PasswordAction::Generate { length, no_upper, no_lower, no_digits, no_symbols } => {
            let charsets = CharsetConfig {
                uppercase: !no_upper,
                lowercase: !no_lower,
                digits: !no_digits,
                symbols: !no_symbols,
            };
            let password = Zeroizing::new(generate_random_password(length, &charsets)?);
            println!("{}", password.as_str());
        }
        PasswordAction::Strength { password } => {
            let password = match password {
                Some(p) => Zeroizing::new(p),
                None => Zeroizing::new(
                    rpassword::prompt_password("Password: ").context("reading password")?,
                ),
            };
            let strength = evaluate_strength(&password);
            println!("score: {}/100 ({})", strength.score, strength.level.as_str());
            for hint in &strength.feedback {
                println!("  - {hint}");
            }
        }
    }
    Ok(())
}

// ── `fileenc cert` ────────────────────────────────────────────────────────────

fn cmd_cert_generate(
    subject: &str,
    bits: usize,
    years: u32,
    out: &Path,
    public_out: Option<&Path>,
) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("generating {bits}-bit RSA key"));
    spinner.enable_steady_tick(Duration::from_millis(80));
    let generated = Certificate::generate_self_signed(subject, bits, years);
    spinner.finish_and_clear();
    let certificate = generated.context("generating certificate")?;

    write_new(out, certificate.export_json(true)?.as_bytes(), true)?;
    if let Some(path) = public_out {
        write_new(path, certificate.export_json(false)?.as_bytes(), false)?;
    }

    let info = certificate.info();
    println!("subject:    {}", info.subject);
    println!("thumbprint: {}", info.thumbprint);
    println!("valid:      {} .. {}", info.valid_from, info.valid_to);
    println!("written:    {}", out.display());
    if let Some(path) = public_out {
        println!("public:     {}", path.display());
    }
    Ok(())
}

fn cmd_cert_list(dir: &Path) -> Result<()> {
    let store = InMemoryCertificateStore::from_dir(dir)
        .map_err(describe)
        .with_context(|| format!("reading {}", dir.display()))?;
    let available = store.list_available();
    if available.is_empty() {
        println!("no valid certificates in {}", dir.display());
        return Ok(());
    }
    for info in available {
        let key = if info.has_private_key { "private key" } else { "public only" };
        println!(
            "{}  {}  {}  until {}  [{key}]",
            info.thumbprint, info.friendly_name, info.subject, info.valid_to
        );
    }
    Ok(())
}
