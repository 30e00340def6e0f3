//! # escena-devtools
//!
//! Terminal inspector for the persisted shared state.
//!
//! ## Commands
//! ```text
//! escena-devtools dump [slice]        print the tree or one slice
//! escena-devtools set <slice> <json>  merge a partial, flush, persist
//! escena-devtools clear               remove every key under the app prefix
//! escena-devtools migrate             import legacy flat keys, print outcomes
//! escena-devtools keys                list raw storage keys
//! ```
//!
//! Configuration comes from `escena.toml` and `ESCENA_*` variables, the same
//! as any other consumer of the store.

use anyhow::{bail, Context, Result};
use escena_core::SliceKey;
use escena_storage::StorageBackend;
use escena_sync::{instance, Host, LegacyBridge, Store, StoreConfig};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: escena-devtools <command>

commands:
  dump [slice]          print the full state tree or one slice
  set <slice> <json>    merge a JSON partial into a slice and persist it
  clear                 remove every persisted key under the app prefix
  migrate               import legacy flat keys and print per-key outcomes
  keys                  list the raw keys in the storage backend";

#[derive(Debug)]
enum Command {
    Dump(Option<SliceKey>),
    Set(SliceKey, Value),
    Clear,
    Migrate,
    Keys,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match args.as_slice() {
            ["dump"] => Command::Dump(None),
            ["dump", slice] => Command::Dump(Some(slice.parse()?)),
            ["set", slice, json] => {
                let partial = serde_json::from_str(json)
                    .with_context(|| format!("'{}' is not valid JSON", json))?;
                Command::Set(slice.parse()?, partial)
            }
            ["clear"] => Command::Clear,
            ["migrate"] => Command::Migrate,
            ["keys"] => Command::Keys,
            _ => bail!("{}", USAGE),
        };
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    debug!(?command, "Parsed command");

    let mut config = StoreConfig::load_or_default(None);
    // The inspector reads what is on disk; it does not import or mirror.
    config.migrate_legacy = false;
    config.legacy_mirror = false;
    let store = instance::create_instance(config.clone(), Host::from_config(&config)?)?;

    let result = run(&store, command);
    store.destroy();
    result
}

fn run(store: &Store, command: Command) -> Result<()> {
    match command {
        Command::Dump(None) => {
            let tree = store.debug().get_state()?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Command::Dump(Some(key)) => {
            let slice = store.get(key.as_str())?;
            println!("{}", serde_json::to_string_pretty(&slice.to_json()?)?);
        }
        Command::Set(key, partial) => {
            store.set_json(key.as_str(), partial)?;
            store.flush();
            let written = store.persist_now();
            info!(slice = %key, written, "Slice updated");
            if !store.config().persists(key) {
                println!("note: '{}' is not persisted; the change is lost on exit", key);
            }
        }
        Command::Clear => {
            let removed = store.debug().clear_storage()?;
            println!("removed {} key(s)", removed);
        }
        Command::Migrate => {
            let bridge = LegacyBridge::new(&store.config().app_prefix, store.storage().clone());
            for (key, state) in bridge.scan().outcomes {
                println!("before  {:<16} {}", key.as_str(), state);
            }
            let report = store.import_legacy();
            store.flush();
            store.persist_now();
            for (key, state) in &report.outcomes {
                println!("after   {:<16} {}", key.as_str(), state);
            }
            println!(
                "applied {}, failed {}",
                report.applied(),
                report.failed()
            );
        }
        Command::Keys => {
            for key in store.storage().keys()? {
                println!("{}", key);
            }
        }
    }
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - Default: INFO, DEBUG for escena crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,escena=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
