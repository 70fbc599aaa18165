//! Settlement of staged cleartext deposits into an encrypted balance.

use super::{insert_balance, insert_packed_key, BalanceOperation, MAX_TXS_TO_PROCESS};
use crate::{
    config::CircuitNames,
    curve::{CurveEngine, PackedPoint, Scalar, ScalarSource},
    elgamal::{ensure_plaintext_range, CipherText, ElgamalPublicKey},
    encoding::EncryptedBalance,
    errors::{Error, Result},
    ledger::{Address, Ledger, PendingDeposit, TxHandle},
    prover::{InputValue, Proof, ProofInputs},
    Balance,
};

use itertools::Itertools;
use log::{debug, info};

/// Stages a cleartext deposit of `amount` for `to`, paying `fee` to whoever settles it.
pub async fn stage_deposit<L: Ledger>(
    ledger: &L,
    amount: Balance,
    to: &ElgamalPublicKey,
    fee: Balance,
) -> Result<TxHandle> {
    ensure_plaintext_range(amount.into())?;
    let to = to.pack();
    let tx = ledger.deposit(amount, &to, fee).await?;
    info!("staged a deposit for {to} ({tx})");
    Ok(tx)
}

/// Settles up to `MAX_TXS_TO_PROCESS` pending deposits of one account.
///
/// Only the account's public key is needed, so any relayer can run it.
pub struct ProcessDeposit {
    account: ElgamalPublicKey,
    min_fee_to_process: Balance,
    relay_fee_recipient: String,
    randomness: ScalarSource,
}

impl ProcessDeposit {
    /// `relay_fee_recipient` is checked in `init`. `randomness` must be
    /// `ScalarSource::Secure` outside of tests.
    pub fn new(
        account: ElgamalPublicKey,
        min_fee_to_process: Balance,
        relay_fee_recipient: &str,
        randomness: ScalarSource,
    ) -> Self {
        Self {
            account,
            min_fee_to_process,
            relay_fee_recipient: relay_fee_recipient.into(),
            randomness,
        }
    }
}

#[derive(Clone)]
pub struct PreparedDeposit {
    pub account: PackedPoint,
    pub relay_fee_recipient: Address,
    pub indexes: Vec<u64>,
    pub amounts: Vec<Balance>,
    pub total_amount: Balance,
    pub old_balance: EncryptedBalance,
    /// `Encrypt(pub, 0)`, present when the account had no balance yet.
    pub zero_balance: Option<CipherText>,
    /// The ciphertext the deposit total is added to.
    pub starting_balance: CipherText,
    pub encrypted_total: CipherText,
    pub randomness: Scalar,
    pub new_balance: CipherText,
}

impl PreparedDeposit {
    /// The `zeroBalance` argument of the settlement call: the materialized zero
    /// encryption, or the all-zero quadruple when the account was funded.
    pub fn zero_balance_argument(&self) -> EncryptedBalance {
        self.zero_balance
            .as_ref()
            .map(EncryptedBalance::from)
            .unwrap_or_default()
    }
}

impl BalanceOperation for ProcessDeposit {
    type Prepared = PreparedDeposit;
    const NAME: &'static str = "process-deposit";

    fn circuit<'c>(&self, circuits: &'c CircuitNames) -> &'c str {
        &circuits.process_pending_deposit
    }

    async fn prepare<L: Ledger>(&self, curve: &CurveEngine, ledger: &L) -> Result<PreparedDeposit> {
        let relay_fee_recipient = Address::parse(&self.relay_fee_recipient)?;
        let account = self.account.pack();

        let count = ledger.pending_deposit_counts(&account).await?;
        debug!("{account} has {count} pending deposits");
        let mut selected: Vec<(u64, PendingDeposit)> = Vec::with_capacity(MAX_TXS_TO_PROCESS);
        for index in 0..count {
            if selected.len() == MAX_TXS_TO_PROCESS {
                break;
            }
            let entry = ledger.all_pending_deposits_mapping(&account, index).await?;
            if entry.amount != 0 && entry.fee >= self.min_fee_to_process {
                selected.push((index, entry));
            }
        }
        ensure!(!selected.is_empty(), Error::NothingToProcess);

        let total: u128 = selected.iter().map(|(_, e)| u128::from(e.amount)).sum();
        let total_amount = ensure_plaintext_range(total)?;

        let old_balance = ledger.balances(&account).await?;
        let (starting_balance, zero_balance) = if old_balance.is_zero() {
            debug!("{account} is unfunded, starting from an explicit zero");
            let zero = CipherText::zero_encryption(curve, &self.account, &self.randomness.draw(curve));
            (zero, Some(zero))
        } else {
            (CipherText::try_from(&old_balance)?, None)
        };

        let randomness = self.randomness.draw(curve);
        let encrypted_total = self.account.encrypt(curve, total_amount, &randomness)?;
        let new_balance = starting_balance.homomorphic_add(&encrypted_total);

        let (indexes, amounts) = selected.into_iter().map(|(i, e)| (i, e.amount)).unzip();
        Ok(PreparedDeposit {
            account,
            relay_fee_recipient,
            indexes,
            amounts,
            total_amount,
            old_balance,
            zero_balance,
            starting_balance,
            encrypted_total,
            randomness,
            new_balance,
        })
    }

    fn proof_inputs(&self, _curve: &CurveEngine, prepared: &PreparedDeposit) -> Result<ProofInputs> {
        let amounts = prepared
            .amounts
            .iter()
            .map(|a| InputValue::integer(*a))
            .pad_using(MAX_TXS_TO_PROCESS, |_| InputValue::integer(0))
            .collect();

        let mut inputs = ProofInputs::new();
        inputs
            .insert("randomness", InputValue::field(&prepared.randomness))
            .insert("amounts", InputValue::List(amounts))
            .insert("total_amount", InputValue::integer(prepared.total_amount));
        insert_packed_key(&mut inputs, "packed_public_key", &prepared.account);
        insert_balance(
            &mut inputs,
            "balance_old_encrypted",
            &EncryptedBalance::from(&prepared.starting_balance),
        );
        insert_balance(
            &mut inputs,
            "balance_new_encrypted",
            &EncryptedBalance::from(&prepared.new_balance),
        );
        Ok(inputs)
    }

    async fn submit<L: Ledger>(
        &self,
        ledger: &L,
        prepared: &PreparedDeposit,
        proof: &Proof,
    ) -> Result<TxHandle> {
        ledger
            .process_pending_deposit(
                proof,
                &prepared.indexes,
                &prepared.relay_fee_recipient,
                &prepared.account,
                &prepared.zero_balance_argument(),
                &EncryptedBalance::from(&prepared.new_balance),
            )
            .await
    }
}
