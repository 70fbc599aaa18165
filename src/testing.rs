//! Fixtures shared by the unit tests, the integration tests and the benches.

use crate::{
    curve::{CurveEngine, PackedPoint},
    elgamal::{BabyStepGiantStep, CipherText, ElgamalKeys, ElgamalPublicKey},
    encoding::EncryptedBalance,
    errors::{Error, Result},
    ledger::{Address, Ledger, PendingDeposit, PendingTransfer, TxHandle},
    prover::{Proof, ProofInputs, ProverClient},
    Balance,
};

use rand_core::{CryptoRng, RngCore};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Search range of `test_solver`.
pub const TEST_RANGE_BITS: u32 = 24;

/// A solver small enough to build in every test.
pub fn test_solver(curve: &CurveEngine) -> BabyStepGiantStep {
    BabyStepGiantStep::with_range_bits(curve, TEST_RANGE_BITS)
}

pub fn issue_assets<R: RngCore + CryptoRng>(
    curve: &CurveEngine,
    rng: &mut R,
    pub_account: &ElgamalPublicKey,
    init_balance: &CipherText,
    amount: Balance,
) -> Result<CipherText> {
    let (_, encrypted_amount) = pub_account.encrypt_value(curve, amount, rng)?;
    Ok(init_balance + &encrypted_amount)
}

/// A key pair and an encryption of `initial_amount` under it.
///
/// Panics when `initial_amount` is outside of the plain text range.
pub fn create_account_with_amount<R: RngCore + CryptoRng>(
    curve: &CurveEngine,
    rng: &mut R,
    initial_amount: Balance,
) -> (ElgamalKeys, CipherText) {
    let account = gen_keys(curve, rng);

    let (_, initial_balance) = account
        .public
        .encrypt_value(curve, 0, rng)
        .expect("zero is in range");
    let initial_balance = if initial_amount > 0 {
        issue_assets(curve, rng, &account.public, &initial_balance, initial_amount)
            .expect("initial amount in range")
    } else {
        initial_balance
    };

    (account, initial_balance)
}

pub fn gen_keys<R: RngCore + CryptoRng>(curve: &CurveEngine, rng: &mut R) -> ElgamalKeys {
    ElgamalKeys::generate(curve, rng)
}

// ------------------------------------------------------------------------
// In-memory ledger.
// ------------------------------------------------------------------------

/// A write call received by `InMemoryLedger`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerCall {
    Deposit {
        amount: Balance,
        to: PackedPoint,
        fee: Balance,
    },
    Transfer {
        to: PackedPoint,
        from: PackedPoint,
        process_fee: Balance,
        relay_fee: Balance,
        relay_fee_recipient: Address,
        encrypted_amount: EncryptedBalance,
        new_balance: EncryptedBalance,
    },
    Withdraw {
        from: PackedPoint,
        to: Address,
        amount: Balance,
        relay_fee: Balance,
        relay_fee_recipient: Address,
        new_balance: EncryptedBalance,
    },
    ProcessPendingDeposit {
        indexes: Vec<u64>,
        relay_fee_recipient: Address,
        account: PackedPoint,
        zero_balance: EncryptedBalance,
        new_balance: EncryptedBalance,
    },
    ProcessPendingTransfer {
        indexes: Vec<u64>,
        process_fee_recipient: Address,
        account: PackedPoint,
        new_balance: EncryptedBalance,
    },
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<PackedPoint, EncryptedBalance>,
    deposits: HashMap<PackedPoint, Vec<PendingDeposit>>,
    transfers: HashMap<PackedPoint, Vec<PendingTransfer>>,
    calls: Vec<LedgerCall>,
    fail_next_write: Option<String>,
    tx_count: u64,
}

impl LedgerState {
    fn begin_write(&mut self) -> Result<()> {
        match self.fail_next_write.take() {
            Some(reason) => Err(Error::ChainCallError(reason)),
            None => Ok(()),
        }
    }

    fn record(&mut self, call: LedgerCall) -> TxHandle {
        self.calls.push(call);
        self.tx_count += 1;
        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&self.tx_count.to_be_bytes());
        TxHandle(hash)
    }
}

/// A ledger kept in memory that applies writes the way the contract does.
///
/// Proofs are not verified. Settled pending entries are zeroed in place, so
/// counts never shrink.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_balance(&self, account: &PackedPoint, balance: &CipherText) {
        self.state()
            .balances
            .insert(*account, EncryptedBalance::from(balance));
    }

    /// The stored balance, or the all-zero quadruple.
    pub fn balance(&self, account: &PackedPoint) -> EncryptedBalance {
        self.state()
            .balances
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    pub fn add_pending_transfer(&self, account: &PackedPoint, amount: &CipherText, fee: Balance) {
        self.state()
            .transfers
            .entry(*account)
            .or_default()
            .push(PendingTransfer {
                amount: amount.into(),
                fee,
            });
    }

    pub fn pending_deposits(&self, account: &PackedPoint) -> Vec<PendingDeposit> {
        self.state().deposits.get(account).cloned().unwrap_or_default()
    }

    pub fn pending_transfers(&self, account: &PackedPoint) -> Vec<PendingTransfer> {
        self.state().transfers.get(account).cloned().unwrap_or_default()
    }

    /// Every successful write so far.
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state().calls.clone()
    }

    /// Makes the next write call revert with `reason`.
    pub fn fail_next_write(&self, reason: &str) {
        self.state().fail_next_write = Some(reason.into());
    }
}

fn out_of_range(index: u64) -> Error {
    Error::ChainCallError(format!("pending index {index} out of range"))
}

impl Ledger for InMemoryLedger {
    async fn balances(&self, account: &PackedPoint) -> Result<EncryptedBalance> {
        Ok(self.balance(account))
    }

    async fn pending_deposit_counts(&self, account: &PackedPoint) -> Result<u64> {
        Ok(self.pending_deposits(account).len() as u64)
    }

    async fn all_pending_deposits_mapping(
        &self,
        account: &PackedPoint,
        index: u64,
    ) -> Result<PendingDeposit> {
        self.pending_deposits(account)
            .get(index as usize)
            .copied()
            .ok_or_else(|| out_of_range(index))
    }

    async fn pending_transfer_counts(&self, account: &PackedPoint) -> Result<u64> {
        Ok(self.pending_transfers(account).len() as u64)
    }

    async fn all_pending_transfers_mapping(
        &self,
        account: &PackedPoint,
        index: u64,
    ) -> Result<PendingTransfer> {
        self.pending_transfers(account)
            .get(index as usize)
            .copied()
            .ok_or_else(|| out_of_range(index))
    }

    async fn deposit(&self, amount: Balance, to: &PackedPoint, fee: Balance) -> Result<TxHandle> {
        let mut state = self.state();
        state.begin_write()?;
        state
            .deposits
            .entry(*to)
            .or_default()
            .push(PendingDeposit { amount, fee });
        Ok(state.record(LedgerCall::Deposit {
            amount,
            to: *to,
            fee,
        }))
    }

    async fn transfer(
        &self,
        to: &PackedPoint,
        from: &PackedPoint,
        process_fee: Balance,
        relay_fee: Balance,
        relay_fee_recipient: &Address,
        encrypted_amount: &EncryptedBalance,
        new_balance: &EncryptedBalance,
        _proof: &Proof,
    ) -> Result<TxHandle> {
        let mut state = self.state();
        state.begin_write()?;
        state.balances.insert(*from, *new_balance);
        state.transfers.entry(*to).or_default().push(PendingTransfer {
            amount: *encrypted_amount,
            fee: process_fee,
        });
        Ok(state.record(LedgerCall::Transfer {
            to: *to,
            from: *from,
            process_fee,
            relay_fee,
            relay_fee_recipient: *relay_fee_recipient,
            encrypted_amount: *encrypted_amount,
            new_balance: *new_balance,
        }))
    }

    async fn withdraw(
        &self,
        from: &PackedPoint,
        to: &Address,
        amount: Balance,
        relay_fee: Balance,
        relay_fee_recipient: &Address,
        _proof: &Proof,
        new_balance: &EncryptedBalance,
    ) -> Result<TxHandle> {
        let mut state = self.state();
        state.begin_write()?;
        state.balances.insert(*from, *new_balance);
        Ok(state.record(LedgerCall::Withdraw {
            from: *from,
            to: *to,
            amount,
            relay_fee,
            relay_fee_recipient: *relay_fee_recipient,
            new_balance: *new_balance,
        }))
    }

    async fn process_pending_deposit(
        &self,
        _proof: &Proof,
        indexes: &[u64],
        relay_fee_recipient: &Address,
        account: &PackedPoint,
        zero_balance: &EncryptedBalance,
        new_balance: &EncryptedBalance,
    ) -> Result<TxHandle> {
        let mut state = self.state();
        state.begin_write()?;
        let pending = state.deposits.entry(*account).or_default();
        if let Some(index) = indexes.iter().find(|i| **i as usize >= pending.len()) {
            return Err(out_of_range(*index));
        }
        for index in indexes {
            pending[*index as usize] = PendingDeposit::default();
        }
        state.balances.insert(*account, *new_balance);
        Ok(state.record(LedgerCall::ProcessPendingDeposit {
            indexes: indexes.to_vec(),
            relay_fee_recipient: *relay_fee_recipient,
            account: *account,
            zero_balance: *zero_balance,
            new_balance: *new_balance,
        }))
    }

    async fn process_pending_transfer(
        &self,
        _proof: &Proof,
        indexes: &[u64],
        process_fee_recipient: &Address,
        account: &PackedPoint,
        new_balance: &EncryptedBalance,
    ) -> Result<TxHandle> {
        let mut state = self.state();
        state.begin_write()?;
        let pending = state.transfers.entry(*account).or_default();
        if let Some(index) = indexes.iter().find(|i| **i as usize >= pending.len()) {
            return Err(out_of_range(*index));
        }
        for index in indexes {
            pending[*index as usize] = PendingTransfer::default();
        }
        state.balances.insert(*account, *new_balance);
        Ok(state.record(LedgerCall::ProcessPendingTransfer {
            indexes: indexes.to_vec(),
            process_fee_recipient: *process_fee_recipient,
            account: *account,
            new_balance: *new_balance,
        }))
    }
}

// ------------------------------------------------------------------------
// Scripted prover.
// ------------------------------------------------------------------------

#[derive(Default)]
struct ProverState {
    scripted: VecDeque<Result<Proof>>,
    requests: Vec<(String, ProofInputs)>,
}

/// A prover that records each request and answers with a fixed proof, unless
/// a different answer was queued.
#[derive(Default)]
pub struct ScriptedProver {
    state: Mutex<ProverState>,
}

impl ScriptedProver {
    /// The proof returned when nothing else is queued.
    pub const PROOF: [u8; 8] = *b"zk-proof";

    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ProverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_next(&self, reason: &str) {
        self.state()
            .scripted
            .push_back(Err(Error::ProofGenerationError(reason.into())));
    }

    /// The next request exits cleanly without producing a proof.
    pub fn return_empty_next(&self) {
        self.state().scripted.push_back(Ok(Proof::default()));
    }

    /// Every `(circuit, inputs)` pair received so far.
    pub fn requests(&self) -> Vec<(String, ProofInputs)> {
        self.state().requests.clone()
    }
}

impl ProverClient for ScriptedProver {
    async fn prove(&self, circuit: &str, inputs: &ProofInputs) -> Result<Proof> {
        let mut state = self.state();
        state.requests.push((circuit.to_string(), inputs.clone()));
        state
            .scripted
            .pop_front()
            .unwrap_or_else(|| Ok(Proof(Self::PROOF.to_vec())))
    }
}
