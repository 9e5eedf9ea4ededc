use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Subscriber de consola. Los registros de `log` de los crates de librería
/// llegan por el puente `tracing-log`.
pub fn setup_logging(verbosity: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    let filter = EnvFilter::try_from_env("SIMFLOW_LOG").unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr)
                                   .with_target(false)
                                   .without_time()
                                   .compact();
    if let Err(e) = tracing_subscriber::registry().with(filter).with(stderr_layer).try_init() {
        eprintln!("logging already initialised: {e}");
    }
}
