// src/lib.rs

//! Readiness notification over Linux `epoll`, with ownership of the watched
//! handles tracked for as long as the kernel can report them.
//!
//! - [`poll`]: the watcher itself (create / add / modify / remove / wait).
//! - [`config`]: TOML configuration for the `epwatch` binary.
//! - [`source`]: handles the binary registers (paths, stdin).

pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod poll;
pub mod source;
pub mod types;

pub use errors::{EpwatchError, Result};
pub use poll::{
    AsDescriptor, AsyncWatcher, CtlOp, Event, Interest, MAX_BATCH, WaitCanceller, Watcher,
    WatcherOptions,
};

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::source::Source;

/// High-level entry point used by `main.rs`: [`run_with`] on stdout, with
/// Ctrl-C as the shutdown trigger.
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    run_with(args, std::io::stdout(), tokio::signal::ctrl_c()).await
}

/// Drive one `epwatch` session, writing event lines to `out`.
///
/// This wires together:
/// - config loading
/// - opening and registering every configured source
/// - a bounded number of wait rounds, printing one line per event
/// - shutdown: when `shutdown` resolves, a byte is written to a socket pair
///   registered in the watcher, so a blocked wait returns
pub async fn run_with<W, F>(args: CliArgs, mut out: W, shutdown: F) -> anyhow::Result<()>
where
    W: Write,
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let cfg = resolve_config(&args)?;

    if args.dry_run {
        print_dry_run(&mut out, &cfg, args.stdin)?;
        return Ok(());
    }

    if cfg.watch.is_empty() && !args.stdin {
        anyhow::bail!("nothing to watch: add [[watch]] entries to the config or pass --stdin");
    }

    let watcher: AsyncWatcher<Source> = AsyncWatcher::with_options(cfg.watcher.options())?;

    for entry in &cfg.watch {
        let source = Arc::new(Source::open(&entry.path)?);
        register(&watcher, source, entry.interest())?;
        info!(path = ?entry.path, interest = %entry.interest(), "watching");
    }
    if args.stdin {
        register(&watcher, Arc::new(Source::stdin()), Interest::IN)?;
        info!("watching <stdin>");
    }

    let (wakeup, mut wakeup_tx) = Source::wakeup_pair()?;
    watcher.add(Arc::new(wakeup), Interest::IN)?;
    tokio::spawn(async move {
        if let Err(e) = shutdown.await {
            warn!("failed to listen for shutdown: {e}");
            return;
        }
        if let Err(e) = wakeup_tx.write_all(b"\0") {
            warn!("failed to wake the watcher: {e}");
        }
    });

    let timeout = args.timeout_ms.map(Duration::from_millis);

    for round in 0..args.rounds {
        let events = watcher.wait(timeout).await?;
        debug!(round, count = events.len(), "wait round finished");

        let mut shutdown = false;
        for event in &events {
            if event.subject.is_wakeup() {
                shutdown = true;
                continue;
            }
            writeln!(out, "{} {}", event.subject, event.mask)?;

            // Consume level-triggered input so the next round reports new data.
            if event.mask.is_readable() {
                if let Err(e) = event.subject.drain() {
                    warn!(source = %event.subject, "failed to drain: {e}");
                }
            }
        }
        out.flush()?;

        if shutdown {
            info!("shutdown requested; stopping");
            break;
        }
    }

    watcher.close().context("closing watcher")?;
    Ok(())
}

/// Register `source`, naming it in the error. `EPERM` from the kernel means
/// the descriptor type does not support polling (e.g. `/dev/null`).
fn register(
    watcher: &AsyncWatcher<Source>,
    source: Arc<Source>,
    interest: Interest,
) -> anyhow::Result<()> {
    let name = source.to_string();
    watcher.add(source, interest).map_err(|e| {
        let context = match e.raw_os_error() {
            Some(libc::EPERM) => format!("{name} is not pollable"),
            _ => format!("registering {name}"),
        };
        anyhow::Error::new(e).context(context)
    })?;
    Ok(())
}

/// Load the config file, or fall back to defaults when it is absent and
/// `--stdin` gives us something to watch anyway.
fn resolve_config(args: &CliArgs) -> anyhow::Result<ConfigFile> {
    let path = Path::new(&args.config);
    if !path.exists() && args.stdin {
        debug!(config = ?path, "config file not found; using defaults");
        return Ok(ConfigFile::default());
    }
    load_and_validate(path).with_context(|| format!("loading config {}", path.display()))
}

/// Dry-run output: print the resolved options and registrations.
fn print_dry_run(out: &mut impl Write, cfg: &ConfigFile, stdin: bool) -> std::io::Result<()> {
    writeln!(out, "epwatch dry-run")?;
    writeln!(out, "  watcher.max_batch = {}", cfg.watcher.max_batch)?;
    writeln!(out, "  watcher.on_interrupt = {:?}", cfg.watcher.on_interrupt)?;
    writeln!(out)?;

    let total = cfg.watch.len() + usize::from(stdin);
    writeln!(out, "watch ({total}):")?;
    for entry in &cfg.watch {
        writeln!(out, "  - {}", entry.path.display())?;
        writeln!(out, "      interest: {}", entry.interest())?;
    }
    if stdin {
        writeln!(out, "  - <stdin>")?;
        writeln!(out, "      interest: {}", Interest::IN)?;
    }

    debug!("dry-run complete (nothing opened)");
    Ok(())
}
