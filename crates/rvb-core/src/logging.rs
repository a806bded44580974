use std::{backtrace::Backtrace, fs::OpenOptions, path::Path, sync::Mutex};

use tracing_subscriber::{
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{errors::Error, Result};

/// Wall-clock time of day, e.g. `[14:03:27]`.
struct LocalClock;

impl FormatTime for LocalClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", chrono::Local::now().format("%X"))
    }
}

/// Initialize logging for the bot.
///
/// Every record goes to stdout and is appended to `log_file` at the same time.
/// The default filter is `debug` for our crates and `info` for everything
/// else; `RUST_LOG` overrides it.
pub fn init(service_name: &str, log_file: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,rvb=debug,rvb_core=debug,rvb_console=debug,rvb_revolt=debug,\
             lua=debug,{service_name}=debug"
        ))
    });

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    let stdout_layer = fmt::layer().with_timer(LocalClock).with_ansi(true);
    let file_layer = fmt::layer()
        .with_timer(LocalClock)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::External(format!("failed to install logger: {e}")))?;

    install_panic_hook();
    Ok(())
}

/// Route panics through the logger instead of bare stderr.
///
/// Panics inside handler tasks are contained by the runtime; this only makes
/// sure they end up in the log file with a backtrace.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!("Unhandled exception occurred: {info}\n{backtrace}");
    }));
}
