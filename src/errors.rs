use thiserror::Error;

use crate::Balance;

/// Confidential balance error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bytes or coordinates that do not describe a curve point.
    #[error("The encoding does not describe a point on the curve")]
    CurveEncodingError,

    /// Unable to encrypt a plain text outside of the valid range.
    #[error("Plain text {value} is outside of the valid range [0, 2^40)")]
    PlainTextRangeError { value: u128 },

    /// The discrete log search did not find the plain text.
    #[error("Encrypted value was not found within the valid range")]
    DecryptionRangeExceeded,

    /// An address argument was not a 20-byte hex address.
    #[error("Malformed address `{address}`")]
    AddressValidationError { address: String },

    /// A coordinator phase was called out of order.
    #[error("Cannot run `{phase}` while the coordinator is {state}")]
    StateTransitionError {
        phase: &'static str,
        state: &'static str,
    },

    /// The external prover failed or returned nothing.
    #[error("Proof generation failed: {0}")]
    ProofGenerationError(String),

    /// A ledger read or write reverted or returned malformed data.
    #[error("Ledger call failed: {0}")]
    ChainCallError(String),

    /// The sender has attempted to spend more than their balance.
    #[error("Balance {balance} does not cover the required {required}")]
    NotEnoughFund { balance: Balance, required: Balance },

    /// No pending entry met the settlement criteria.
    #[error("No pending entry qualifies for settlement")]
    NothingToProcess,

    /// The configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl From<codec::Error> for Error {
    fn from(err: codec::Error) -> Self {
        Error::ChainCallError(err.to_string())
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
