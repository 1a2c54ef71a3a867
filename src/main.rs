//! packetlogd: line-delimited packet journal server.
//!
//! Binds a TCP socket (default 0.0.0.0:9000), appends every `\n`-terminated
//! packet it receives to an on-disk journal, and echoes the full journal
//! content back to the sender after each packet. `-d` detaches the process
//! from the terminal once the socket is bound, so bind failures are still
//! visible to the invoking shell.

use packetlog::config::Config;
use packetlog::daemon;
use packetlog::server::Server;
use packetlog::shutdown::{self, ShutdownFlag};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(config) {
        error!(error = %e, "Fatal error");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let flag = ShutdownFlag::new();
    shutdown::install(&flag)?;

    info!(
        listen = %config.listen,
        data_file = %config.data_file.display(),
        daemon = config.daemon,
        "Starting packetlog server"
    );

    // Bind before any detach: startup failures must reach the terminal, and
    // the daemonized child inherits the already-listening socket.
    let server = Server::bind(&config, flag)?;

    if config.daemon {
        daemon::daemonize()?;
    }

    server.run()?;
    Ok(())
}
