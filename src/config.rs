//! Runtime configuration.
//!
//! Loaded from a TOML file named by `CONFIDENTIAL_BALANCE_CONFIG`, or from an
//! explicit path. Every table and key is optional:
//!
//! ```toml
//! [prover]
//! nargo = "nargo"
//! circuits_dir = "./circuits"
//! timeout_secs = 600
//!
//! [circuits]
//! transfer = "transfer"
//!
//! [settlement]
//! min_fee_to_process = 0
//!
//! [decryption]
//! range_bits = 40
//! table_path = "./bsgs.bin"
//! ```

use crate::{
    curve::CurveEngine,
    elgamal::{discrete_log::MAX_RANGE_BITS, BabyStepGiantStep},
    errors::{Error, Result},
    Balance, BALANCE_RANGE,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "CONFIDENTIAL_BALANCE_CONFIG";

const DEFAULT_NARGO: &str = "nargo";
const DEFAULT_CIRCUITS_DIR: &str = "./circuits";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub circuits: CircuitNames,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub decryption: DecryptionConfig,
}

/// Where and how the nargo prover runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default = "default_nargo")]
    pub nargo: PathBuf,
    #[serde(default = "default_circuits_dir")]
    pub circuits_dir: PathBuf,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            nargo: default_nargo(),
            circuits_dir: default_circuits_dir(),
            timeout_secs: None,
        }
    }
}

fn default_nargo() -> PathBuf {
    DEFAULT_NARGO.into()
}

fn default_circuits_dir() -> PathBuf {
    DEFAULT_CIRCUITS_DIR.into()
}

/// Circuit project names, one per operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitNames {
    #[serde(default = "default_transfer")]
    pub transfer: String,
    #[serde(default = "default_withdraw")]
    pub withdraw: String,
    #[serde(default = "default_process_deposit")]
    pub process_pending_deposit: String,
    #[serde(default = "default_process_transfer")]
    pub process_pending_transfer: String,
}

impl Default for CircuitNames {
    fn default() -> Self {
        Self {
            transfer: default_transfer(),
            withdraw: default_withdraw(),
            process_pending_deposit: default_process_deposit(),
            process_pending_transfer: default_process_transfer(),
        }
    }
}

fn default_transfer() -> String {
    "transfer".into()
}

fn default_withdraw() -> String {
    "withdraw".into()
}

fn default_process_deposit() -> String {
    "process_pending_deposits".into()
}

fn default_process_transfer() -> String {
    "process_pending_transfers".into()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Pending entries paying less than this are left for later.
    #[serde(default)]
    pub min_fee_to_process: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionConfig {
    #[serde(default = "default_range_bits")]
    pub range_bits: u32,
    /// A baby-step table written by `BabyStepGiantStep::write_table`.
    #[serde(default)]
    pub table_path: Option<PathBuf>,
}

impl Default for DecryptionConfig {
    fn default() -> Self {
        Self {
            range_bits: default_range_bits(),
            table_path: None,
        }
    }
}

fn default_range_bits() -> u32 {
    BALANCE_RANGE
}

impl DecryptionConfig {
    /// Loads the stored table when one is configured, otherwise builds it.
    pub fn solver(&self, curve: &CurveEngine) -> Result<BabyStepGiantStep> {
        ensure!(
            (1..=MAX_RANGE_BITS).contains(&self.range_bits),
            Error::ConfigError(format!(
                "range_bits must be in 1..={MAX_RANGE_BITS}, got {}",
                self.range_bits
            ))
        );
        let Some(path) = &self.table_path else {
            return Ok(BabyStepGiantStep::with_range_bits(curve, self.range_bits));
        };
        let file = std::fs::File::open(path)
            .map_err(|e| Error::ConfigError(format!("cannot open {}: {e}", path.display())))?;
        let solver = BabyStepGiantStep::read_table(curve, std::io::BufReader::new(file))?;
        ensure!(
            solver.range_bits() == self.range_bits,
            Error::ConfigError(format!(
                "{} covers {} bits, expected {}",
                path.display(),
                solver.range_bits(),
                self.range_bits
            ))
        );
        Ok(solver)
    }
}

impl ProtocolConfig {
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::ConfigError(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml(&content)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads the file named by `CONFIDENTIAL_BALANCE_CONFIG`, or the defaults
    /// when the variable is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        let config = ProtocolConfig::from_toml("").unwrap();
        assert_eq!(config, ProtocolConfig::default());
        assert_eq!(config.prover.nargo, PathBuf::from("nargo"));
        assert_eq!(config.circuits.transfer, "transfer");
        assert_eq!(config.settlement.min_fee_to_process, 0);
        assert_eq!(config.decryption.range_bits, 40);
    }

    #[test]
    fn partial_tables() {
        let config = ProtocolConfig::from_toml(
            r#"
            [prover]
            circuits_dir = "/opt/circuits"
            timeout_secs = 30

            [circuits]
            withdraw = "withdraw_v2"

            [settlement]
            min_fee_to_process = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.prover.nargo, PathBuf::from("nargo"));
        assert_eq!(config.prover.circuits_dir, PathBuf::from("/opt/circuits"));
        assert_eq!(config.prover.timeout_secs, Some(30));
        assert_eq!(config.circuits.withdraw, "withdraw_v2");
        assert_eq!(config.circuits.transfer, "transfer");
        assert_eq!(config.settlement.min_fee_to_process, 3);
    }

    #[test]
    fn malformed_document() {
        assert!(matches!(
            ProtocolConfig::from_toml("[settlement]\nmin_fee_to_process = \"x\""),
            Err(Error::ConfigError(_))
        ));
        assert!(matches!(
            ProtocolConfig::load("/nonexistent/config.toml"),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn stored_table_is_used() {
        let curve = CurveEngine::new();
        let dir = tempfile::tempdir().unwrap();
        let table_path = dir.path().join("bsgs.bin");
        let built = BabyStepGiantStep::with_range_bits(&curve, 10);
        built
            .write_table(std::fs::File::create(&table_path).unwrap())
            .unwrap();

        let config_path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            "[decryption]\nrange_bits = 10\ntable_path = {:?}",
            table_path.to_str().unwrap()
        )
        .unwrap();

        let config = ProtocolConfig::load(&config_path).unwrap();
        let solver = config.decryption.solver(&curve).unwrap();
        assert_eq!(solver.range_bits(), 10);

        let mismatched = DecryptionConfig {
            range_bits: 12,
            ..config.decryption
        };
        assert!(matches!(
            mismatched.solver(&curve),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn range_bits_outside_solver_limits() {
        let curve = CurveEngine::new();
        for range_bits in [0, MAX_RANGE_BITS + 1, 64] {
            let document = format!("[decryption]\nrange_bits = {range_bits}");
            let config = ProtocolConfig::from_toml(&document).unwrap();
            assert!(matches!(
                config.decryption.solver(&curve),
                Err(Error::ConfigError(_))
            ));
        }
    }
}
