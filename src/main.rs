//! Utilkit command line tool
//!
//! Runs the TCP/TLS relay and exposes a few of the library helpers.

use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;

use utilkit::common::{init_logger, parse_level, Result};
use utilkit::config::{ConfigLoader, DEFAULT_CONFIG_FILE, LOG_LEVEL_STR};
use utilkit::datetime::{datetimestr, pretty_duration};
use utilkit::kv::KvStore;
use utilkit::relay::{Passthrough, Relay};
use utilkit::tls::{get_cert_fingerprint, get_cert_subject};
use utilkit::{APP_NAME, VERSION};

/// Utilkit: relay and helper commands
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forward TCP connections, optionally terminating or originating TLS
    Relay(RelayArgs),

    /// Read and write the key-value store
    Kv {
        /// Database file (defaults to the shared store in the temp directory)
        #[clap(long)]
        db: Option<PathBuf>,

        #[clap(subcommand)]
        action: KvAction,
    },

    /// Format a number of seconds as `1W2D3H4m5s`
    Duration { seconds: i64 },

    /// Format a unix timestamp in local time
    Date {
        timestamp: i64,

        /// strftime format
        #[clap(long)]
        format: Option<String>,
    },
}

#[derive(Args, Debug)]
struct RelayArgs {
    /// JSON configuration file
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    config_file: PathBuf,

    /// Listen address
    #[clap(short, long)]
    listen: Option<String>,

    /// Remote address
    #[clap(short, long)]
    remote: Option<String>,

    /// Connect to the remote over TLS
    #[clap(long)]
    tls_upstream: bool,

    /// Terminate TLS on the listener
    #[clap(long)]
    tls_server: bool,

    /// Server certificate path
    #[clap(long)]
    cert: Option<PathBuf>,

    /// Server private key path
    #[clap(long)]
    key: Option<PathBuf>,

    /// Log level
    #[clap(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum KvAction {
    Get { key: String },
    Put { key: String, value: String },
    Delete { key: String },
    /// Print the rows of a table, or of every table
    Dump { table: Option<String> },
    Tables,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Relay(args) => relay(args).await,
        Command::Kv { db, action } => kv(db, action),
        Command::Duration { seconds } => {
            println!("{}", pretty_duration(seconds));
            Ok(())
        }
        Command::Date { timestamp, format } => {
            println!("{}", datetimestr(timestamp, format.as_deref()));
            Ok(())
        }
    }
}

async fn relay(args: RelayArgs) -> Result<()> {
    // Loading the configuration logs, so the logger comes first. Without a
    // --log-level or RUST_LOG the level from the configuration applies once loaded.
    let level_from_config = args.log_level.is_none() && std::env::var_os("RUST_LOG").is_none();
    match &args.log_level {
        Some(level) => init_logger(level),
        None if level_from_config => {
            init_logger("trace");
            log::set_max_level(parse_level(LOG_LEVEL_STR)?);
        }
        None => init_logger(LOG_LEVEL_STR),
    }

    let mut settings = ConfigLoader::new().with_file(&args.config_file).load()?;
    if level_from_config {
        log::set_max_level(parse_level(&settings.log_level)?);
    }

    // Command line flags win over file and environment
    if let Some(listen) = args.listen {
        settings.listen = listen;
    }
    if let Some(remote) = args.remote {
        settings.remote = remote;
    }
    if let Some(level) = args.log_level {
        settings.log_level = level;
    }
    settings.tls_upstream |= args.tls_upstream;
    settings.tls_server |= args.tls_server;
    if args.cert.is_some() {
        settings.server_cert = args.cert;
    }
    if args.key.is_some() {
        settings.server_key = args.key;
    }

    info!("Starting {} v{}", APP_NAME, VERSION);
    settings.validate()?;
    info!("Relay: {}", settings);

    if let Some(cert) = &settings.server_cert {
        match get_cert_subject(cert) {
            Ok(subject) => info!("Certificate subject: {}", subject),
            Err(e) => warn!("Unable to get certificate subject: {}", e),
        }
        match get_cert_fingerprint(cert) {
            Ok(fingerprint) => info!("Certificate fingerprint: {}", fingerprint),
            Err(e) => warn!("Unable to get certificate fingerprint: {}", e),
        }
    }

    let handle = Relay::new(settings)?.with_handler(Passthrough).start().await?;
    info!("Relay ready on {}, press Ctrl+C to stop", handle.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.shutdown().await
}

fn kv(db: Option<PathBuf>, action: KvAction) -> Result<()> {
    init_logger("warn");
    let store = KvStore::open(db.as_deref())?;

    match action {
        KvAction::Get { key } => match store.get(&key)? {
            Some(value) => println!("{}", value),
            None => warn!("Key not found: {}", key),
        },
        KvAction::Put { key, value } => {
            if let Some(previous) = store.put(&key, value)? {
                info!("Replaced previous value: {}", previous);
            }
        }
        KvAction::Delete { key } => {
            if !store.delete(&key)? {
                warn!("Key not found: {}", key);
            }
        }
        KvAction::Dump { table } => store.dump(table.as_deref())?,
        KvAction::Tables => {
            for table in store.tables()? {
                println!("{}", table);
            }
        }
    }
    Ok(())
}
