//! Isolation worker
//!
//! Scans one module file in a separate process so that a crash while
//! loading an untrusted binary costs a single file instead of the host.
//! Results and diagnostics go to stdout as one JSON message per line;
//! tracing output goes to stderr to keep the protocol stream clean.
//! Exit code 0 means the scan finished (even with no metadata found).

use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Result};
use tracing::debug;

use brokkr_core::{ModuleReflector, WorkerMessage};
use brokkr_scan::SidecarReflector;

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(e) => {
            emit(&WorkerMessage::Exception {
                text: format!("{e:#}"),
            });
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.as_slice() {
        [command, path] if command == "scan-module" => Ok(scan_module(Path::new(path))),
        _ => bail!("usage: brokkr-worker scan-module <file>"),
    }
}

fn scan_module(path: &Path) -> ExitCode {
    emit(&WorkerMessage::Progress {
        work: 0.0,
        text: format!("scanning {}", path.display()),
    });
    if !path.is_file() {
        emit(&WorkerMessage::Error {
            text: format!("{}: no such file", path.display()),
        });
        return ExitCode::FAILURE;
    }

    match SidecarReflector.reflect(path) {
        Ok(metadata) => {
            debug!(
                "Scanned {:?}: metadata {}",
                path,
                if metadata.is_some() { "found" } else { "absent" }
            );
            emit(&WorkerMessage::Completed { metadata });
            ExitCode::SUCCESS
        }
        Err(e) => {
            emit(&WorkerMessage::Error {
                text: e.to_string(),
            });
            ExitCode::FAILURE
        }
    }
}

fn emit(message: &WorkerMessage) {
    println!("{}", message.encode());
}
