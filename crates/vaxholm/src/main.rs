#![forbid(unsafe_code)]

//! Vaxholm CLI — sign SOAP documents with WS-Security.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use vaxholm_core::Error;
use vaxholm_keys::KeyStore;
use vaxholm_wsse::{SignatureRequest, DEFAULT_TTL_SECS};

#[derive(Parser)]
#[command(
    name = "vaxholm",
    about = "Vaxholm — WS-Security SOAP message signing",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a SOAP document with a key from a PKCS#12 store
    Sign {
        /// Key store alias of the signing key
        #[arg(short, long)]
        alias: String,

        /// Key store passphrase
        #[arg(short, long)]
        password: String,

        /// Passphrase for the aliased key (defaults to the store passphrase)
        #[arg(long = "key-password")]
        key_password: Option<String>,

        /// PKCS#12 key store file
        #[arg(short = 'c', long = "certstore")]
        store: PathBuf,

        /// Input SOAP document
        #[arg(short, long)]
        source: PathBuf,

        /// Output file for the signed document
        #[arg(short, long)]
        target: PathBuf,

        /// Timestamp time to live in seconds
        #[arg(long, default_value_t = DEFAULT_TTL_SECS)]
        ttl: u64,

        /// Key identification strategy: issuer-serial, binary-security-token,
        /// subject-key-identifier or thumbprint
        #[arg(long = "key-id", default_value = "issuer-serial")]
        key_id: String,

        /// Signature algorithm URI
        #[arg(long = "signature-alg")]
        signature_alg: Option<String>,

        /// Digest algorithm URI
        #[arg(long = "digest-alg")]
        digest_alg: Option<String>,

        /// SOAP 1.1 actor / SOAP 1.2 role the Security header is addressed to
        #[arg(long)]
        actor: Option<String>,
    },

    /// List supported algorithms and key identification strategies
    Info,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    vaxholm_wsse::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Sign {
            alias,
            password,
            key_password,
            store,
            source,
            target,
            ttl,
            key_id,
            signature_alg,
            digest_alg,
            actor,
        } => cmd_sign(
            alias,
            password,
            key_password,
            store,
            source,
            target,
            ttl,
            key_id,
            signature_alg,
            digest_alg,
            actor,
        ),
        Commands::Info => cmd_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_sign(
    alias: String,
    password: String,
    key_password: Option<String>,
    store_path: PathBuf,
    source: PathBuf,
    target: PathBuf,
    ttl: u64,
    key_id: String,
    signature_alg: Option<String>,
    digest_alg: Option<String>,
    actor: Option<String>,
) -> Result<(), Error> {
    let store_bytes = std::fs::read(&store_path)
        .map_err(|e| Error::Other(format!("{}: {e}", store_path.display())))?;
    let store = KeyStore::open(&store_bytes, &password)?;

    let key_password = key_password.unwrap_or_else(|| password.clone());
    let mut request = SignatureRequest::new(alias, key_password);
    request.ttl_secs = ttl;
    request.key_identifier = key_id.parse()?;
    if let Some(uri) = signature_alg {
        request.signature_algorithm = uri;
    }
    if let Some(uri) = digest_alg {
        request.digest_algorithm = uri;
    }
    request.policy.actor = actor;

    let xml = std::fs::read_to_string(&source)
        .map_err(|e| Error::Other(format!("{}: {e}", source.display())))?;
    let signed = vaxholm_wsse::sign(&xml, &store, &request)?;
    std::fs::write(&target, signed)
        .map_err(|e| Error::Other(format!("{}: {e}", target.display())))
}

fn cmd_info() -> Result<(), Error> {
    println!("Vaxholm — WS-Security SOAP message signing");
    println!();
    println!("Supported digest algorithms:");
    println!("  SHA-1, SHA-256, SHA-384, SHA-512");
    println!();
    println!("Supported signature algorithms:");
    println!("  RSA PKCS#1 v1.5 (SHA-1, SHA-256, SHA-384, SHA-512)");
    println!("  ECDSA P-256 (SHA-256), P-384 (SHA-384)");
    println!();
    println!("Key identification strategies:");
    println!("  issuer-serial (default), binary-security-token,");
    println!("  subject-key-identifier, thumbprint");
    println!();
    println!("Supported key stores:");
    println!("  PKCS#12 (.p12/.pfx), PBES2 and legacy PBE encryption");
    println!();
    println!("Canonicalization:");
    println!("  Exclusive C14N 1.0 (±comments)");
    Ok(())
}
