//! `ProverClient` backed by the `nargo` CLI.
//!
//! Each request writes `<circuits_dir>/<circuit>/<name>.toml`, runs
//! `nargo prove --prover-name <name>` inside the circuit directory and reads
//! the hex proof from `proofs/<circuit>.proof`. nargo always writes the proof
//! to that path, so requests for the same circuit run one at a time.

use super::{Proof, ProofInputs, ProverClient};
use crate::{
    config::ProverConfig,
    errors::{Error, Result},
};

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::{io::AsyncWriteExt, process::Command, sync::Mutex};
use uuid::Uuid;

fn prover_error(context: &str, err: impl std::fmt::Display) -> Error {
    Error::ProofGenerationError(format!("{context}: {err}"))
}

/// Runs Noir circuits from a directory of nargo projects.
///
/// Clones share the per-circuit locks.
#[derive(Clone, Debug)]
pub struct NargoProver {
    nargo: PathBuf,
    circuits_dir: PathBuf,
    timeout: Option<Duration>,
    circuit_locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl NargoProver {
    pub fn new(circuits_dir: impl Into<PathBuf>) -> Self {
        Self {
            nargo: PathBuf::from("nargo"),
            circuits_dir: circuits_dir.into(),
            timeout: None,
            circuit_locks: Default::default(),
        }
    }

    pub fn from_config(config: &ProverConfig) -> Self {
        Self {
            nargo: config.nargo.clone(),
            circuits_dir: config.circuits_dir.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            circuit_locks: Default::default(),
        }
    }

    /// Uses another `nargo` binary than the one on `PATH`.
    pub fn with_binary(mut self, nargo: impl Into<PathBuf>) -> Self {
        self.nargo = nargo.into();
        self
    }

    /// Kills the prover and fails the request when it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn circuit_lock(&self, circuit: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .circuit_locks
            .lock()
            .map_err(|_| prover_error("circuit locks", "poisoned"))?;
        Ok(locks.entry(circuit.to_string()).or_default().clone())
    }

    async fn run(&self, circuit_dir: &Path, circuit: &str, prover_name: &str) -> Result<Proof> {
        let proof_path = circuit_dir.join("proofs").join(format!("{circuit}.proof"));
        match tokio::fs::remove_file(&proof_path).await {
            Ok(()) => debug!("removed stale {}", proof_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(prover_error(
                    &format!("cannot remove {}", proof_path.display()),
                    e,
                ))
            }
        }

        info!("running nargo prove for `{circuit}` ({prover_name})");
        let mut command = Command::new(&self.nargo);
        command
            .args(["prove", "--prover-name", prover_name])
            .current_dir(circuit_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, command.output())
                .await
                .map_err(|_| prover_error("nargo timed out", format!("{timeout:?}")))?,
            None => command.output().await,
        }
        .map_err(|e| prover_error("cannot run nargo", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("nargo failed for `{circuit}`: {stderr}");
            return Err(prover_error("nargo failed", output.status));
        }
        debug!("nargo output: {}", String::from_utf8_lossy(&output.stdout));

        let raw = tokio::fs::read_to_string(&proof_path)
            .await
            .map_err(|e| prover_error(&format!("cannot read {}", proof_path.display()), e))?;
        let proof = Proof::from_hex(raw.trim())?;
        ensure!(
            !proof.is_empty(),
            Error::ProofGenerationError(format!("{} is empty", proof_path.display()))
        );
        info!("proof for `{circuit}` generated: {} bytes", proof.0.len());
        Ok(proof)
    }
}

/// Creates `path` readable by the owner only.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.flush().await
}

impl ProverClient for NargoProver {
    async fn prove(&self, circuit: &str, inputs: &ProofInputs) -> Result<Proof> {
        let circuit_dir = self.circuits_dir.join(circuit);
        ensure!(
            circuit_dir.is_dir(),
            Error::ProofGenerationError(format!("circuit {} not found", circuit_dir.display()))
        );

        let document = inputs.to_toml()?;
        let lock = self.circuit_lock(circuit)?;
        let _guard = lock.lock().await;

        let prover_name = format!("prover_{}", Uuid::new_v4().simple());
        let input_path = circuit_dir.join(format!("{prover_name}.toml"));
        debug!("writing {} ({} bytes)", input_path.display(), document.len());
        if let Err(e) = write_private(&input_path, document.as_bytes()).await {
            // Drop a partial document.
            let _ = tokio::fs::remove_file(&input_path).await;
            return Err(prover_error("cannot write prover inputs", e));
        }

        let result = self.run(&circuit_dir, circuit, &prover_name).await;

        // The input document holds private keys.
        if let Err(e) = tokio::fs::remove_file(&input_path).await {
            warn!("cannot remove {}: {e}", input_path.display());
        }
        result
    }
}
