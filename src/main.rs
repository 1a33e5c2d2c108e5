use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
mod auth;
use pwkeystore::message::{self, MessageCipher, MessageMetadata, SealedMessage};
use pwkeystore::{Context, DEFAULT_ITERATIONS, KeyStore, Storage, StoreOptions, default_storage};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn resolve_storage(path: Option<PathBuf>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)),
        None => default_storage(),
    }
}

fn parse_json(what: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{what} must be valid JSON"))
}

#[derive(Debug, Parser)]
#[command(name = "pwkeystore")]
#[command(
    version,
    about = "Local key store protecting private key data with a password."
)]
struct Cli {
    /// Path to the key file
    #[arg(long, global = true, value_name = "PATH", env = "KEYFILE")]
    keyfile: Option<PathBuf>,

    /// PBKDF2 iterations for newly saved keys
    #[arg(
        long,
        global = true,
        env = "KEYSTORE_ITERATIONS",
        default_value_t = DEFAULT_ITERATIONS
    )]
    iterations: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Lists all key IDs
    List,

    /// Prints the public data of a key
    #[command(arg_required_else_help = true)]
    Public { id: String },

    /// Decrypts and prints the private data of a key
    #[command(arg_required_else_help = true)]
    Private { id: String },

    /// Prints the stored record without decrypting it
    #[command(arg_required_else_help = true)]
    Raw { id: String },

    /// Encrypts and stores a key, replacing any existing one
    #[command(arg_required_else_help = true)]
    Save {
        id: String,
        /// Private data as JSON
        private: String,
        /// Public data as JSON
        #[arg(long)]
        public: Option<String>,
    },

    /// Replaces the public data of an existing key
    #[command(arg_required_else_help = true)]
    SetPublic { id: String, public: String },

    /// Removes a key
    #[command(arg_required_else_help = true)]
    Remove { id: String },

    /// Generates and stores a random message key
    #[command(arg_required_else_help = true)]
    Keygen {
        id: String,
        /// Public data as JSON
        #[arg(long)]
        public: Option<String>,
    },

    /// Encrypts a message with the message key of a user
    #[command(arg_required_else_help = true)]
    Seal { username: String, message: String },

    /// Decrypts a sealed message
    #[command(arg_required_else_help = true)]
    Open { username: String, sealed: String },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Cli::parse();
    let ctx = Context::init().context("failed to initialize crypto")?;
    let options = StoreOptions::new(args.iterations)?;
    let storage = resolve_storage(args.keyfile)?;
    let mut store = KeyStore::open(ctx, storage, options).context("failed to open key file")?;

    match args.command {
        Commands::List => {
            for id in store.key_ids() {
                println!("{id}");
            }
        }
        Commands::Public { id } => {
            let public = store.public_key_data(&id)?;
            println!("{}", serde_json::to_string_pretty(&public)?);
        }
        Commands::Private { id } => {
            let password = auth::read_password()?;
            let private = store.private_key_data(&id, password.as_bytes())?;
            println!("{}", serde_json::to_string_pretty(&private)?);
        }
        Commands::Raw { id } => {
            let record = store.raw_key_data(&id)?;
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        Commands::Save {
            id,
            private,
            public,
        } => {
            let private = parse_json("private data", &private)?;
            let public = public.map(|p| parse_json("public data", &p)).transpose()?;
            let password = auth::read_new_password_with_confirmation()?;
            store.save_key(&id, password.as_bytes(), &private, public.as_ref())?;
            println!("saved key '{id}'");
        }
        Commands::SetPublic { id, public } => {
            let public = parse_json("public data", &public)?;
            store.save_public_key_data(&id, Some(public))?;
            println!("updated public data of '{id}'");
        }
        Commands::Remove { id } => {
            store.remove_key(&id)?;
            println!("removed key '{id}'");
        }
        Commands::Keygen { id, public } => {
            let public = public.map(|p| parse_json("public data", &p)).transpose()?;
            let key = message::generate_key(&ctx)?;
            let password = auth::read_new_password_with_confirmation()?;
            store.save_key(&id, password.as_bytes(), &key, public.as_ref())?;
            println!("generated message key '{id}'");
        }
        Commands::Seal { username, message } => {
            let password = auth::read_password()?;
            let metadata = MessageMetadata { username };
            let sealed =
                MessageCipher::new(ctx).seal(&store, &message, &metadata, password.as_bytes())?;
            println!("{}", serde_json::to_string(&sealed)?);
        }
        Commands::Open { username, sealed } => {
            let sealed: SealedMessage =
                serde_json::from_str(&sealed).context("sealed message must be valid JSON")?;
            let password = auth::read_password()?;
            let metadata = MessageMetadata { username };
            let message =
                MessageCipher::new(ctx).open(&store, &sealed, &metadata, password.as_bytes())?;
            println!("{message}");
        }
    }

    Ok(())
}
