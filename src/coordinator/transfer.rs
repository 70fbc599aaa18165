//! Confidential transfer from one account to another.
//!
//! The sender's new balance is its decrypted balance minus the amount and
//! both fees, re-encrypted with fresh randomness. The amount is encrypted
//! under the recipient's key and staged on the ledger until the recipient
//! settles it with `ProcessTransfer`.

use super::{
    insert_balance, insert_packed_key, remaining_balance, spendable_balance, BalanceOperation,
};
use crate::{
    config::CircuitNames,
    curve::{CurveEngine, PackedPoint, Scalar, ScalarSource},
    elgamal::{ensure_plaintext_range, CipherText, DiscreteLogSolver, ElgamalKeys, ElgamalPublicKey},
    encoding::{nonce, EncryptedBalance},
    errors::Result,
    ledger::{Address, Ledger, TxHandle},
    prover::{InputValue, Proof, ProofInputs},
    Balance,
};

use log::debug;

/// The address that receives no relay fee.
pub const NO_RELAYER: &str = "0x0000000000000000000000000000000000000000";

/// A transfer request, built by the sender.
pub struct Transfer<'a> {
    sender: &'a ElgamalKeys,
    solver: &'a dyn DiscreteLogSolver,
    to: PackedPoint,
    amount: Balance,
    relay_fee: Balance,
    relay_fee_recipient: String,
    process_fee: Balance,
    randomness: ScalarSource,
}

impl<'a> Transfer<'a> {
    /// `randomness` must be `ScalarSource::Secure` outside of tests.
    pub fn new(
        sender: &'a ElgamalKeys,
        solver: &'a dyn DiscreteLogSolver,
        to: PackedPoint,
        amount: Balance,
        randomness: ScalarSource,
    ) -> Self {
        Self {
            sender,
            solver,
            to,
            amount,
            relay_fee: 0,
            relay_fee_recipient: NO_RELAYER.into(),
            process_fee: 0,
            randomness,
        }
    }

    /// Pays `fee` to the relayer at `recipient`; the address is checked in `init`.
    pub fn with_relay_fee(mut self, fee: Balance, recipient: &str) -> Self {
        self.relay_fee = fee;
        self.relay_fee_recipient = recipient.into();
        self
    }

    /// Fee for whoever later settles the transfer on the recipient's side.
    ///
    /// Waived when the recipient's account is unfunded.
    pub fn with_process_fee(mut self, fee: Balance) -> Self {
        self.process_fee = fee;
        self
    }
}

/// Everything `init` computed for a transfer.
#[derive(Clone)]
pub struct PreparedTransfer {
    pub from: PackedPoint,
    pub to: PackedPoint,
    pub amount: Balance,
    pub relay_fee: Balance,
    pub relay_fee_recipient: Address,
    /// After the unfunded-recipient waiver.
    pub process_fee: Balance,
    pub old_balance: EncryptedBalance,
    pub old_balance_clear: Balance,
    pub recipient_balance: EncryptedBalance,
    pub new_balance: CipherText,
    pub new_balance_randomness: Scalar,
    pub encrypted_amount: CipherText,
    pub amount_randomness: Scalar,
    pub nonce: Scalar,
}

impl<'a> BalanceOperation for Transfer<'a> {
    type Prepared = PreparedTransfer;
    const NAME: &'static str = "transfer";

    fn circuit<'c>(&self, circuits: &'c CircuitNames) -> &'c str {
        &circuits.transfer
    }

    async fn prepare<L: Ledger>(&self, curve: &CurveEngine, ledger: &L) -> Result<PreparedTransfer> {
        let relay_fee_recipient = Address::parse(&self.relay_fee_recipient)?;
        let recipient_key = ElgamalPublicKey::from_packed(&self.to)?;
        ensure_plaintext_range(self.amount.into())?;

        let from = self.sender.public.pack();
        let (old_balance, old_balance_clear) =
            spendable_balance(curve, ledger, self.solver, self.sender).await?;

        let recipient_balance = ledger.balances(&self.to).await?;
        let process_fee = if recipient_balance.is_zero() {
            debug!("recipient {} is unfunded, waiving the process fee", self.to);
            0
        } else {
            self.process_fee
        };

        let new_balance_clear = remaining_balance(
            old_balance_clear,
            &[self.amount, self.relay_fee, process_fee],
        )?;

        let new_balance_randomness = self.randomness.draw(curve);
        let new_balance = self
            .sender
            .public
            .encrypt(curve, new_balance_clear, &new_balance_randomness)?;
        let amount_randomness = self.randomness.draw(curve);
        let encrypted_amount = recipient_key.encrypt(curve, self.amount, &amount_randomness)?;

        Ok(PreparedTransfer {
            from,
            to: self.to,
            amount: self.amount,
            relay_fee: self.relay_fee,
            relay_fee_recipient,
            process_fee,
            nonce: nonce(&old_balance),
            old_balance,
            old_balance_clear,
            recipient_balance,
            new_balance,
            new_balance_randomness,
            encrypted_amount,
            amount_randomness,
        })
    }

    fn proof_inputs(&self, _curve: &CurveEngine, prepared: &PreparedTransfer) -> Result<ProofInputs> {
        let mut inputs = ProofInputs::new();
        inputs
            .insert("private_key", InputValue::field(&self.sender.secret.secret()))
            .insert("randomness1", InputValue::field(&prepared.new_balance_randomness))
            .insert("randomness2", InputValue::field(&prepared.amount_randomness))
            .insert("value", InputValue::integer(prepared.amount))
            .insert("balance_old_me_clear", InputValue::integer(prepared.old_balance_clear))
            .insert("process_fee", InputValue::integer(prepared.process_fee))
            .insert("relay_fee", InputValue::integer(prepared.relay_fee))
            .insert("nonce", InputValue::field(&prepared.nonce));
        insert_packed_key(&mut inputs, "packed_public_key", &prepared.from);
        insert_packed_key(&mut inputs, "packed_public_key_to", &prepared.to);
        insert_balance(&mut inputs, "balance_old_me_encrypted", &prepared.old_balance);
        insert_balance(&mut inputs, "balance_old_to_encrypted", &prepared.recipient_balance);
        insert_balance(
            &mut inputs,
            "balance_new_me_encrypted",
            &EncryptedBalance::from(&prepared.new_balance),
        );
        insert_balance(
            &mut inputs,
            "encrypted_amount",
            &EncryptedBalance::from(&prepared.encrypted_amount),
        );
        Ok(inputs)
    }

    async fn submit<L: Ledger>(
        &self,
        ledger: &L,
        prepared: &PreparedTransfer,
        proof: &Proof,
    ) -> Result<TxHandle> {
        ledger
            .transfer(
                &prepared.to,
                &prepared.from,
                prepared.process_fee,
                prepared.relay_fee,
                &prepared.relay_fee_recipient,
                &EncryptedBalance::from(&prepared.encrypted_amount),
                &EncryptedBalance::from(&prepared.new_balance),
                proof,
            )
            .await
    }
}
