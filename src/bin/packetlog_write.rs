//! packetlog-write: single-shot file writer.
//!
//! Creates (or truncates) the target file and writes the given string to it
//! fully, with the same file-open and full-write semantics as the journal's
//! append path. The server never invokes it. Exactly two arguments are
//! required; anything else prints usage and exits non-zero without touching
//! any file.

use clap::Parser;
use packetlog::journal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "packetlog-write")]
#[command(version = "0.1.0")]
#[command(about = "Write a string to a file, creating or truncating it", long_about = None)]
struct CliArgs {
    /// File to create or truncate
    writefile: PathBuf,
    /// String to write
    writestr: String,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    match journal::write_truncate(&args.writefile, args.writestr.as_bytes()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(path = %args.writefile.display(), error = %e, "Write failed");
            ExitCode::FAILURE
        }
    }
}
