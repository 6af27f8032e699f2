//! # CLI - attribute store operator shell
//!
//! A REPL over a write-back attribute cache backed by a file store. Reads
//! commands from stdin, one per line, and prints results to stdout. Logs go
//! to stderr, filtered by `RUST_LOG` (default `warn`).
//!
//! ## Commands
//!
//! ```text
//! GET obj attr          Attribute value (or "(nil)")
//! SET obj attr value    Set an attribute
//! DEL obj attr          Delete an attribute
//! KGET type key         Raw record lookup; type is a name or number
//! KPUT type key value   Raw record write
//! KDEL type key         Raw record delete
//! SYNC                  Write every dirty entry to the store
//! RESET                 Sync, then empty the cache and zero the stats
//! STATS                 Cache statistics
//! OBJS                  Cached attributes per object
//! ATTRS                 Every cached attribute
//! DUMP ON|OFF           Toggle dump mode
//! OPTIMIZE              Sync, then compact the store file
//! EXIT / QUIT           Sync and shut down
//! ```
//!
//! Settings come from [`config::Config`]: `ATTRSTORE_CONF`,
//! `ATTRSTORE_CACHE_SIZE`, `ATTRSTORE_CACHE_WIDTH`, `ATTRSTORE_DB` and
//! `ATTRSTORE_SYNC`.
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! attrstore started (db=attrs.db, records=0, cache=1000000 bytes, width=200)
//! > SET 12 5 Hello
//! OK
//! > GET 12 5
//! Hello
//! > EXIT
//! bye
//! ```

mod shell;

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use cache::Cache;
use config::Config;
use store::{DiskStore, FileStore};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::shell::Shell;

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let config = Config::load().context("loading configuration")?;
    let mut store = FileStore::open(&config.database)
        .with_context(|| format!("opening store {}", config.database.display()))?;
    store.set_sync(config.sync_writes);
    let records = store.len();
    info!(
        db = %config.database.display(),
        records,
        cache_size = config.cache_size,
        cache_width = config.cache_width,
        sync_writes = config.sync_writes,
        "store opened"
    );

    let cache = Cache::new(store, config.cache_width, config.cache_size);
    println!(
        "attrstore started (db={}, records={}, cache={} bytes, width={})",
        config.database.display(),
        records,
        cache.size_budget(),
        cache.width()
    );
    println!("Commands: GET obj attr | SET obj attr value | DEL obj attr");
    println!("          KGET type key | KPUT type key value | KDEL type key");
    println!("          SYNC | RESET | STATS | OBJS | ATTRS | DUMP ON|OFF | OPTIMIZE | EXIT");

    let mut shell = Shell::new(cache);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write!(out, "> ")?;
    out.flush()?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        if !shell.execute(&line, &mut out)? {
            break;
        }
        write!(out, "> ")?;
        out.flush()?;
    }

    if let Err(e) = shell.finish() {
        error!(error = %e, "final sync failed, dirty entries were not written");
        return Err(e).context("final sync");
    }
    writeln!(out, "bye")?;
    Ok(())
}
