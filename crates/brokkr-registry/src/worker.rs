//! Host side of the isolation worker
//!
//! Module reflection loads untrusted binaries, so it can be delegated to
//! a separate worker process: a crash there costs one file, not the host.
//! The worker speaks one JSON message per line on stdout; stdout lines
//! that do not decode as messages are relayed as plain log output.

use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use brokkr_core::{
    Error, ModuleMetadata, ModuleReflector, ProgressMonitor, RecordingProgress, Result,
    WorkerMessage,
};

/// Spawns the worker binary and relays its message stream
#[derive(Debug, Clone)]
pub struct IsolationClient {
    program: PathBuf,
}

impl IsolationClient {
    /// Create a client for a worker binary
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Scan one module file in the worker process.
    ///
    /// Progress, log, and warning messages are relayed to `progress`;
    /// error and exception messages (and a non-zero exit) fail the scan,
    /// which the caller records against the file and retries next pass.
    pub fn scan_module(
        &self,
        path: &Path,
        progress: &mut dyn ProgressMonitor,
    ) -> Result<Option<ModuleMetadata>> {
        debug!("Spawning isolation worker for {:?}", path);
        let args: Vec<OsString> = vec!["scan-module".into(), path.as_os_str().to_owned()];
        let reader = duct::cmd(&self.program, args).unchecked().reader()?;

        let mut metadata = None;
        let mut failure: Option<String> = None;
        let mut buffered = BufReader::new(reader);
        let mut line = String::new();
        loop {
            line.clear();
            if buffered.read_line(&mut line)? == 0 {
                break;
            }
            match WorkerMessage::decode(&line) {
                Some(WorkerMessage::Completed { metadata: found }) => metadata = found,
                Some(WorkerMessage::Progress { text, .. }) => progress.step(&text),
                Some(WorkerMessage::Message { text }) | Some(WorkerMessage::Log { text }) => {
                    progress.log(&text)
                }
                Some(WorkerMessage::Warning { text }) => progress.warn(&text),
                Some(WorkerMessage::Error { text }) | Some(WorkerMessage::Exception { text }) => {
                    failure = Some(text)
                }
                Some(WorkerMessage::Cancel) => failure = Some("scan cancelled".to_string()),
                None => {
                    // Stray output from the scanned module's tooling
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        progress.log(trimmed);
                    }
                }
            }
        }

        let reader = buffered.into_inner();
        if let Some(output) = reader.try_wait()? {
            if !output.status.success() && failure.is_none() {
                failure = Some(format!("worker exited with {}", output.status));
            }
        }

        match failure {
            Some(message) => Err(Error::module_load(path.display().to_string(), message)),
            None => Ok(metadata),
        }
    }
}

/// Reflector that routes every module through the isolation worker
#[derive(Debug, Clone)]
pub struct IsolatedReflector {
    client: IsolationClient,
}

impl IsolatedReflector {
    /// Create a reflector backed by a worker binary
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            client: IsolationClient::new(program),
        }
    }
}

impl ModuleReflector for IsolatedReflector {
    fn reflect(&self, path: &Path) -> Result<Option<ModuleMetadata>> {
        let mut progress = RecordingProgress::default();
        let result = self.client.scan_module(path, &mut progress);
        for message in &progress.warnings {
            warn!("{}", message);
        }
        for message in &progress.logs {
            debug!("{}", message);
        }
        result
    }
}
