//! Balance coordinators.
//!
//! A coordinator drives one balance operation through three phases:
//! `init` reads the ledger and computes the new ciphertexts, `generate_proof`
//! asks the prover for a proof over them and `submit` issues the ledger write.
//! Each phase only moves the state forward when it succeeds, so a failed
//! submission can be retried from `ProofGenerated`.
//!
//! Coordinators for different accounts share no mutable state and can run
//! concurrently. Two coordinators touching the same account are not
//! serialized here: the caller must queue operations per account, otherwise
//! one of them works from a stale balance.

use crate::{
    config::CircuitNames,
    curve::{CurveEngine, PackedPoint},
    encoding::{scalar_from_packed_le, to_decimal, EncryptedBalance},
    elgamal::{CipherText, DiscreteLogSolver, ElgamalKeys},
    errors::{Error, Result},
    ledger::{Ledger, TxHandle},
    prover::{InputValue, Proof, ProofInputs, ProverClient},
    Balance,
};

use log::{debug, info};

pub mod process_deposit;
pub mod process_transfer;
pub mod transfer;
pub mod withdraw;

pub use process_deposit::{stage_deposit, PreparedDeposit, ProcessDeposit};
pub use process_transfer::{PreparedSettlement, ProcessTransfer};
pub use transfer::{PreparedTransfer, Transfer};
pub use withdraw::{PreparedWithdrawal, Withdrawal};

/// Pending entries settled by one proof; fixed by the circuits.
pub const MAX_TXS_TO_PROCESS: usize = 4;

/// Where a coordinator is in its lifecycle.
#[derive(Clone)]
pub enum CoordinatorState<T> {
    Uninitialized,
    Initialized(T),
    ProofGenerated {
        prepared: T,
        proof: Proof,
    },
    Submitted {
        prepared: T,
        proof: Proof,
        tx: TxHandle,
    },
}

impl<T> Default for CoordinatorState<T> {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl<T> CoordinatorState<T> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized(_) => "initialized",
            Self::ProofGenerated { .. } => "proof-generated",
            Self::Submitted { .. } => "submitted",
        }
    }

    pub fn prepared(&self) -> Option<&T> {
        match self {
            Self::Uninitialized => None,
            Self::Initialized(prepared)
            | Self::ProofGenerated { prepared, .. }
            | Self::Submitted { prepared, .. } => Some(prepared),
        }
    }

    pub fn proof(&self) -> Option<&Proof> {
        match self {
            Self::ProofGenerated { proof, .. } | Self::Submitted { proof, .. } => Some(proof),
            _ => None,
        }
    }

    pub fn tx(&self) -> Option<&TxHandle> {
        match self {
            Self::Submitted { tx, .. } => Some(tx),
            _ => None,
        }
    }

    fn transition_error(&self, phase: &'static str) -> Error {
        Error::StateTransitionError {
            phase,
            state: self.name(),
        }
    }
}

/// One protocol pipeline: what to read, what to prove and what to write.
#[allow(async_fn_in_trait)]
pub trait BalanceOperation {
    /// Output of `init`, carried through the later phases.
    type Prepared;

    /// Used in log lines.
    const NAME: &'static str;

    /// The circuit proving this operation.
    fn circuit<'c>(&self, circuits: &'c CircuitNames) -> &'c str;

    async fn prepare<L: Ledger>(&self, curve: &CurveEngine, ledger: &L) -> Result<Self::Prepared>;

    fn proof_inputs(&self, curve: &CurveEngine, prepared: &Self::Prepared) -> Result<ProofInputs>;

    async fn submit<L: Ledger>(
        &self,
        ledger: &L,
        prepared: &Self::Prepared,
        proof: &Proof,
    ) -> Result<TxHandle>;
}

/// Drives a `BalanceOperation` against a ledger and a prover.
///
/// Single use: once submitted, build a new coordinator for the next operation.
pub struct Coordinator<'a, Op: BalanceOperation, L, P> {
    curve: &'a CurveEngine,
    ledger: &'a L,
    prover: &'a P,
    circuits: CircuitNames,
    operation: Op,
    state: CoordinatorState<Op::Prepared>,
}

impl<'a, Op, L, P> Coordinator<'a, Op, L, P>
where
    Op: BalanceOperation,
    L: Ledger,
    P: ProverClient,
{
    pub fn new(curve: &'a CurveEngine, ledger: &'a L, prover: &'a P, operation: Op) -> Self {
        Self {
            curve,
            ledger,
            prover,
            circuits: CircuitNames::default(),
            operation,
            state: CoordinatorState::Uninitialized,
        }
    }

    /// Overrides the default circuit names.
    pub fn with_circuits(mut self, circuits: CircuitNames) -> Self {
        self.circuits = circuits;
        self
    }

    pub fn operation(&self) -> &Op {
        &self.operation
    }

    pub fn state(&self) -> &CoordinatorState<Op::Prepared> {
        &self.state
    }

    pub fn prepared(&self) -> Option<&Op::Prepared> {
        self.state.prepared()
    }

    /// Reads the ledger and computes the new ciphertexts.
    pub async fn init(&mut self) -> Result<()> {
        ensure!(
            matches!(self.state, CoordinatorState::Uninitialized),
            self.state.transition_error("init")
        );
        let prepared = self.operation.prepare(self.curve, self.ledger).await?;
        info!("{}: uninitialized -> initialized", Op::NAME);
        self.state = CoordinatorState::Initialized(prepared);
        Ok(())
    }

    /// The input document `generate_proof` hands to the prover.
    pub fn proof_inputs(&self) -> Result<ProofInputs> {
        let prepared = self
            .state
            .prepared()
            .ok_or_else(|| self.state.transition_error("proof_inputs"))?;
        self.operation.proof_inputs(self.curve, prepared)
    }

    pub async fn generate_proof(&mut self) -> Result<()> {
        let CoordinatorState::Initialized(prepared) = &self.state else {
            return Err(self.state.transition_error("generate_proof"));
        };
        let inputs = self.operation.proof_inputs(self.curve, prepared)?;
        let circuit = self.operation.circuit(&self.circuits);
        debug!("{}: proving with `{circuit}` ({} inputs)", Op::NAME, inputs.len());

        let proof = self.prover.prove(circuit, &inputs).await?;
        ensure!(
            !proof.is_empty(),
            Error::ProofGenerationError(format!("`{circuit}` returned an empty proof"))
        );

        self.state = match core::mem::take(&mut self.state) {
            CoordinatorState::Initialized(prepared) => {
                CoordinatorState::ProofGenerated { prepared, proof }
            }
            other => other,
        };
        info!("{}: initialized -> proof-generated", Op::NAME);
        Ok(())
    }

    pub async fn submit(&mut self) -> Result<TxHandle> {
        let CoordinatorState::ProofGenerated { prepared, proof } = &self.state else {
            return Err(self.state.transition_error("submit"));
        };
        let tx = self.operation.submit(self.ledger, prepared, proof).await?;

        self.state = match core::mem::take(&mut self.state) {
            CoordinatorState::ProofGenerated { prepared, proof } => {
                CoordinatorState::Submitted { prepared, proof, tx }
            }
            other => other,
        };
        info!("{}: proof-generated -> submitted ({tx})", Op::NAME);
        Ok(tx)
    }

    /// Runs every remaining phase.
    pub async fn run(&mut self) -> Result<TxHandle> {
        if matches!(self.state, CoordinatorState::Uninitialized) {
            self.init().await?;
        }
        if matches!(self.state, CoordinatorState::Initialized(_)) {
            self.generate_proof().await?;
        }
        self.submit().await
    }
}

// ------------------------------------------------------------------------
// Helpers shared by the pipelines.
// ------------------------------------------------------------------------

/// Reads and decrypts the spendable balance of `keys`.
///
/// An unfunded account holds the all-zero quadruple and spends from zero.
pub(crate) async fn spendable_balance<L: Ledger>(
    curve: &CurveEngine,
    ledger: &L,
    solver: &dyn DiscreteLogSolver,
    keys: &ElgamalKeys,
) -> Result<(EncryptedBalance, Balance)> {
    let account = keys.public.pack();
    let stored = ledger.balances(&account).await?;
    debug!("read balance of {account}");
    if stored.is_zero() {
        return Ok((stored, 0));
    }
    let current = CipherText::try_from(&stored)?;
    let clear = keys.secret.decrypt(curve, solver, &current)?;
    Ok((stored, clear))
}

/// `balance - sum(spent)`, failing with `NotEnoughFund` when it would go negative.
pub(crate) fn remaining_balance(balance: Balance, spent: &[Balance]) -> Result<Balance> {
    let required: u128 = spent.iter().map(|v| u128::from(*v)).sum();
    let required = Balance::try_from(required).map_err(|_| Error::PlainTextRangeError {
        value: required,
    })?;
    ensure!(
        balance >= required,
        Error::NotEnoughFund { balance, required }
    );
    Ok(balance - required)
}

/// Inserts `<prefix>_1` and `<prefix>_2` holding `C1` and `C2` of a stored balance.
pub(crate) fn insert_balance(inputs: &mut ProofInputs, prefix: &str, balance: &EncryptedBalance) {
    inputs
        .insert(
            format!("{prefix}_1"),
            InputValue::Point {
                x: to_decimal(&*balance.c1x),
                y: to_decimal(&*balance.c1y),
            },
        )
        .insert(
            format!("{prefix}_2"),
            InputValue::Point {
                x: to_decimal(&*balance.c2x),
                y: to_decimal(&*balance.c2y),
            },
        );
}

/// Inserts the packed key bytes and the same bytes reduced mod `L`.
pub(crate) fn insert_packed_key(inputs: &mut ProofInputs, prefix: &str, packed: &PackedPoint) {
    inputs
        .insert(prefix, InputValue::packed(packed))
        .insert(
            format!("{prefix}_modulus_p"),
            InputValue::field(&scalar_from_packed_le(packed)),
        );
}
