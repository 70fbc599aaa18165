//! confidential_balance implements confidential account balances on top of a
//! public ledger.
//!
//! Balances live on the ledger as exponential Elgamal ciphertexts over the
//! BabyJubJub curve, so amounts stay hidden while zero-knowledge proofs show
//! that every update is correct. The crate holds the cryptographic engine
//! (curve arithmetic, point packing, encryption, bounded decryption, nonce
//! derivation) and the coordinators that compute the ciphertexts a deposit
//! settlement, transfer, transfer settlement or withdrawal must produce
//! before asking an external prover for a proof and submitting it.
//!
//! The ledger and the prover are reached through the `Ledger` and
//! `ProverClient` traits.
//!
//! # Concurrency
//!
//! Coordinators run their phases one after another and share nothing
//! mutable, so coordinators for different accounts can run concurrently.
//! Nothing here serializes operations on the same account: callers must
//! run them one at a time per account (for example behind a per-account
//! lock or queue), otherwise a coordinator can compute from a balance that
//! another operation is about to replace.

#[macro_use]
pub(crate) mod macros;

pub mod errors;

pub mod codec_wrapper;
pub mod config;
pub mod coordinator;
pub mod curve;
pub mod elgamal;
pub mod encoding;
pub mod ledger;
pub mod prover;
pub mod testing;

pub use config::ProtocolConfig;
pub use coordinator::{
    stage_deposit, BalanceOperation, Coordinator, CoordinatorState, ProcessDeposit,
    ProcessTransfer, Transfer, Withdrawal, MAX_TXS_TO_PROCESS,
};
pub use curve::{CurveEngine, PackedPoint, Point, Scalar, ScalarSource};
pub use elgamal::{
    BabyStepGiantStep, CipherText, DiscreteLogSolver, ElgamalKeys, ElgamalPublicKey,
    ElgamalSecretKey,
};
pub use encoding::{nonce, scalar_from_packed_le, EncryptedBalance};
pub use errors::{Error, Result};
pub use ledger::{Address, Ledger, PendingDeposit, PendingTransfer, TxHandle};
pub use prover::{InputValue, NargoProver, Proof, ProofInputs, ProverClient};

/// The balance value to keep confidential.
///
/// Decryption searches the whole plain text space, so balances, amounts and
/// sums of them are limited to `BALANCE_RANGE` bits. The search then costs
/// about `2^20` point additions and a table of `2^20` entries.
pub type Balance = u64;
pub const BALANCE_RANGE: u32 = 40;
