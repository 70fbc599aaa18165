//! Withdrawal of a cleartext amount out of the confidential pool.

use super::{
    insert_balance, insert_packed_key, remaining_balance, spendable_balance, transfer::NO_RELAYER,
    BalanceOperation,
};
use crate::{
    config::CircuitNames,
    curve::{CurveEngine, PackedPoint, Scalar, ScalarSource},
    elgamal::{ensure_plaintext_range, CipherText, DiscreteLogSolver, ElgamalKeys},
    encoding::{nonce, EncryptedBalance},
    errors::Result,
    ledger::{Address, Ledger, TxHandle},
    prover::{InputValue, Proof, ProofInputs},
    Balance,
};

use num_bigint::BigUint;

/// A withdrawal request, built by the account owner.
pub struct Withdrawal<'a> {
    owner: &'a ElgamalKeys,
    solver: &'a dyn DiscreteLogSolver,
    to: String,
    amount: Balance,
    relay_fee: Balance,
    relay_fee_recipient: String,
    randomness: ScalarSource,
}

impl<'a> Withdrawal<'a> {
    /// `to` is checked in `init`. `randomness` must be `ScalarSource::Secure`
    /// outside of tests.
    pub fn new(
        owner: &'a ElgamalKeys,
        solver: &'a dyn DiscreteLogSolver,
        to: &str,
        amount: Balance,
        randomness: ScalarSource,
    ) -> Self {
        Self {
            owner,
            solver,
            to: to.into(),
            amount,
            relay_fee: 0,
            relay_fee_recipient: NO_RELAYER.into(),
            randomness,
        }
    }

    pub fn with_relay_fee(mut self, fee: Balance, recipient: &str) -> Self {
        self.relay_fee = fee;
        self.relay_fee_recipient = recipient.into();
        self
    }
}

#[derive(Clone)]
pub struct PreparedWithdrawal {
    pub from: PackedPoint,
    pub to: Address,
    pub amount: Balance,
    pub relay_fee: Balance,
    pub relay_fee_recipient: Address,
    pub old_balance: EncryptedBalance,
    pub old_balance_clear: Balance,
    pub new_balance: CipherText,
    pub randomness: Scalar,
    pub nonce: Scalar,
}

impl<'a> BalanceOperation for Withdrawal<'a> {
    type Prepared = PreparedWithdrawal;
    const NAME: &'static str = "withdraw";

    fn circuit<'c>(&self, circuits: &'c CircuitNames) -> &'c str {
        &circuits.withdraw
    }

    async fn prepare<L: Ledger>(
        &self,
        curve: &CurveEngine,
        ledger: &L,
    ) -> Result<PreparedWithdrawal> {
        let to = Address::parse(&self.to)?;
        let relay_fee_recipient = Address::parse(&self.relay_fee_recipient)?;
        ensure_plaintext_range(self.amount.into())?;

        let (old_balance, old_balance_clear) =
            spendable_balance(curve, ledger, self.solver, self.owner).await?;
        let new_balance_clear =
            remaining_balance(old_balance_clear, &[self.relay_fee, self.amount])?;

        let randomness = self.randomness.draw(curve);
        let new_balance = self
            .owner
            .public
            .encrypt(curve, new_balance_clear, &randomness)?;

        Ok(PreparedWithdrawal {
            from: self.owner.public.pack(),
            to,
            amount: self.amount,
            relay_fee: self.relay_fee,
            relay_fee_recipient,
            nonce: nonce(&old_balance),
            old_balance,
            old_balance_clear,
            new_balance,
            randomness,
        })
    }

    fn proof_inputs(
        &self,
        _curve: &CurveEngine,
        prepared: &PreparedWithdrawal,
    ) -> Result<ProofInputs> {
        let mut inputs = ProofInputs::new();
        inputs
            .insert("private_key", InputValue::field(&self.owner.secret.secret()))
            .insert("randomness", InputValue::field(&prepared.randomness))
            .insert("value", InputValue::integer(prepared.amount))
            .insert("relay_fee", InputValue::integer(prepared.relay_fee))
            .insert("balance_old_clear", InputValue::integer(prepared.old_balance_clear))
            .insert("nonce", InputValue::field(&prepared.nonce))
            .insert(
                "to",
                InputValue::Field(BigUint::from_bytes_be(&prepared.to.0).to_string()),
            );
        insert_packed_key(&mut inputs, "packed_public_key", &prepared.from);
        insert_balance(&mut inputs, "balance_old_encrypted", &prepared.old_balance);
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
        prepared: &PreparedWithdrawal,
        proof: &Proof,
    ) -> Result<TxHandle> {
        ledger
            .withdraw(
                &prepared.from,
                &prepared.to,
                prepared.amount,
                prepared.relay_fee,
                &prepared.relay_fee_recipient,
                proof,
                &EncryptedBalance::from(&prepared.new_balance),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coordinator::Coordinator,
        errors::Error,
        testing::{create_account_with_amount, gen_keys, test_solver, InMemoryLedger, LedgerCall, ScriptedProver},
    };
    use rand::{rngs::StdRng, SeedableRng};

    const SEED_1: [u8; 32] = [42u8; 32];
    const TO: &str = "0x1111111111111111111111111111111111111111";
    const RELAYER: &str = "0x2222222222222222222222222222222222222222";

    #[tokio::test]
    async fn withdraw_with_relay_fee() {
        let curve = CurveEngine::new();
        let solver = test_solver(&curve);
        let mut rng = StdRng::from_seed(SEED_1);
        let ledger = InMemoryLedger::new();
        let prover = ScriptedProver::new();
        let (account, balance) = create_account_with_amount(&curve, &mut rng, 500);
        ledger.set_balance(&account.public.pack(), &balance);

        let withdrawal = Withdrawal::new(&account, &solver, TO, 120, ScalarSource::Secure)
            .with_relay_fee(4, RELAYER);
        let mut coordinator = Coordinator::new(&curve, &ledger, &prover, withdrawal);
        coordinator.run().await.unwrap();

        let prepared = coordinator.prepared().unwrap();
        assert_eq!(
            account.secret.decrypt(&curve, &solver, &prepared.new_balance),
            Ok(376)
        );
        assert_eq!(
            ledger.balance(&account.public.pack()),
            EncryptedBalance::from(&prepared.new_balance)
        );

        let (circuit, inputs) = prover.requests().pop().unwrap();
        assert_eq!(circuit, "withdraw");
        assert_eq!(inputs.get("balance_old_clear"), Some(&InputValue::integer(500)));
        assert_eq!(
            inputs.get("nonce"),
            Some(&InputValue::field(&nonce(&EncryptedBalance::from(&balance))))
        );

        match ledger.calls().last() {
            Some(LedgerCall::Withdraw {
                to,
                amount,
                relay_fee,
                relay_fee_recipient,
                ..
            }) => {
                assert_eq!(to.to_string(), TO);
                assert_eq!((*amount, *relay_fee), (120, 4));
                assert_eq!(relay_fee_recipient.to_string(), RELAYER);
            }
            other => panic!("expected a withdraw call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn withdraw_everything() {
        let curve = CurveEngine::new();
        let solver = test_solver(&curve);
        let mut rng = StdRng::from_seed(SEED_1);
        let ledger = InMemoryLedger::new();
        let prover = ScriptedProver::new();
        let (account, balance) = create_account_with_amount(&curve, &mut rng, 64);
        ledger.set_balance(&account.public.pack(), &balance);

        let withdrawal = Withdrawal::new(&account, &solver, TO, 60, ScalarSource::Secure)
            .with_relay_fee(4, RELAYER);
        let mut coordinator = Coordinator::new(&curve, &ledger, &prover, withdrawal);
        coordinator.init().await.unwrap();
        let prepared = coordinator.prepared().unwrap();
        assert_eq!(account.secret.decrypt(&curve, &solver, &prepared.new_balance), Ok(0));
    }

    #[tokio::test]
    async fn invalid_requests() {
        let curve = CurveEngine::new();
        let solver = test_solver(&curve);
        let mut rng = StdRng::from_seed(SEED_1);
        let ledger = InMemoryLedger::new();
        let prover = ScriptedProver::new();
        let (account, balance) = create_account_with_amount(&curve, &mut rng, 10);
        ledger.set_balance(&account.public.pack(), &balance);

        for (to, relayer) in [("0xnothex", RELAYER), (TO, "2222222222222222222222222222222222222222")] {
            let withdrawal = Withdrawal::new(&account, &solver, to, 1, ScalarSource::Secure)
                .with_relay_fee(1, relayer);
            let mut coordinator = Coordinator::new(&curve, &ledger, &prover, withdrawal);
            assert!(matches!(
                coordinator.init().await,
                Err(Error::AddressValidationError { .. })
            ));
        }

        let withdrawal = Withdrawal::new(&account, &solver, TO, 10, ScalarSource::Secure)
            .with_relay_fee(1, RELAYER);
        let mut coordinator = Coordinator::new(&curve, &ledger, &prover, withdrawal);
        assert_eq!(
            coordinator.init().await,
            Err(Error::NotEnoughFund {
                balance: 10,
                required: 11
            })
        );

        // An unfunded account has nothing to withdraw.
        let empty = gen_keys(&curve, &mut rng);
        let withdrawal = Withdrawal::new(&empty, &solver, TO, 1, ScalarSource::Secure);
        let mut coordinator = Coordinator::new(&curve, &ledger, &prover, withdrawal);
        assert_eq!(
            coordinator.init().await,
            Err(Error::NotEnoughFund {
                balance: 0,
                required: 1
            })
        );
        assert!(ledger.calls().is_empty());
    }
}
