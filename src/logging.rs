use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use color_eyre::{Result, eyre::WrapErr};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "ROLODEX_LOG";
const LOG_FILE: &str = "rolodex.log";

fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,rolodex=info",
        1 => "info,rolodex=debug",
        2 => "debug,rolodex=trace",
        _ => "trace",
    }
}

/// Routes `tracing` output to a log file. The terminal belongs to the UI, so
/// nothing is ever written to stdout or stderr.
///
/// Returns the path of the file being written.
pub fn init(verbose: u8, log_file: Option<&Path>, data_dir: &Path) -> Result<PathBuf> {
    let path = match log_file {
        Some(path) => path.to_path_buf(),
        None => data_dir.join(LOG_FILE),
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("cannot create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .wrap_err_with(|| format!("cannot open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .with(ErrorLayer::default())
        .try_init()
        .wrap_err("cannot install the tracing subscriber")?;

    tracing::info!(path = %path.display(), "logging_started");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_crate_level() {
        assert_eq!(default_directive(0), "warn,rolodex=info");
        assert_eq!(default_directive(2), "debug,rolodex=trace");
        assert_eq!(default_directive(9), "trace");
    }
}
