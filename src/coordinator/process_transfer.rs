//! Settlement of staged encrypted transfers into the recipient's balance.
//!
//! Entries are already ciphertexts under the recipient's key, so they are
//! added homomorphically without decrypting anything.

use super::{insert_balance, insert_packed_key, BalanceOperation, MAX_TXS_TO_PROCESS};
use crate::{
    config::CircuitNames,
    curve::{CurveEngine, PackedPoint},
    elgamal::{CipherText, ElgamalPublicKey},
    encoding::EncryptedBalance,
    errors::{Error, Result},
    ledger::{Address, Ledger, TxHandle},
    prover::{InputValue, Proof, ProofInputs},
    Balance,
};

use itertools::Itertools;
use log::debug;

/// Settles up to `MAX_TXS_TO_PROCESS` pending transfers of one account.
pub struct ProcessTransfer {
    account: ElgamalPublicKey,
    min_fee_to_process: Balance,
    process_fee_recipient: String,
}

impl ProcessTransfer {
    /// `process_fee_recipient` is checked in `init`.
    pub fn new(
        account: ElgamalPublicKey,
        min_fee_to_process: Balance,
        process_fee_recipient: &str,
    ) -> Self {
        Self {
            account,
            min_fee_to_process,
            process_fee_recipient: process_fee_recipient.into(),
        }
    }
}

#[derive(Clone)]
pub struct PreparedSettlement {
    pub account: PackedPoint,
    pub process_fee_recipient: Address,
    pub indexes: Vec<u64>,
    pub entries: Vec<CipherText>,
    pub old_balance: EncryptedBalance,
    pub new_balance: CipherText,
}

impl BalanceOperation for ProcessTransfer {
    type Prepared = PreparedSettlement;
    const NAME: &'static str = "process-transfer";

    fn circuit<'c>(&self, circuits: &'c CircuitNames) -> &'c str {
        &circuits.process_pending_transfer
    }

    async fn prepare<L: Ledger>(
        &self,
        _curve: &CurveEngine,
        ledger: &L,
    ) -> Result<PreparedSettlement> {
        let process_fee_recipient = Address::parse(&self.process_fee_recipient)?;
        let account = self.account.pack();

        let count = ledger.pending_transfer_counts(&account).await?;
        debug!("{account} has {count} pending transfers");
        let mut indexes = Vec::with_capacity(MAX_TXS_TO_PROCESS);
        let mut entries = Vec::with_capacity(MAX_TXS_TO_PROCESS);
        for index in 0..count {
            if indexes.len() == MAX_TXS_TO_PROCESS {
                break;
            }
            let entry = ledger.all_pending_transfers_mapping(&account, index).await?;
            // Settled slots read back as the all-zero quadruple.
            if entry.amount.is_zero() || entry.fee < self.min_fee_to_process {
                continue;
            }
            entries.push(CipherText::try_from(&entry.amount)?);
            indexes.push(index);
        }
        ensure!(!entries.is_empty(), Error::NothingToProcess);

        let old_balance = ledger.balances(&account).await?;
        let new_balance = if old_balance.is_zero() {
            debug!("{account} is unfunded, starting from the first transfer");
            entries
                .iter()
                .skip(1)
                .fold(entries[0], |acc, e| acc.homomorphic_add(e))
        } else {
            entries
                .iter()
                .fold(CipherText::try_from(&old_balance)?, |acc, e| acc.homomorphic_add(e))
        };

        Ok(PreparedSettlement {
            account,
            process_fee_recipient,
            indexes,
            entries,
            old_balance,
            new_balance,
        })
    }

    fn proof_inputs(
        &self,
        _curve: &CurveEngine,
        prepared: &PreparedSettlement,
    ) -> Result<ProofInputs> {
        let encrypted_values = prepared
            .entries
            .iter()
            .flat_map(|e| [InputValue::point(&e.c1), InputValue::point(&e.c2)])
            .pad_using(2 * MAX_TXS_TO_PROCESS, |_| InputValue::zero_point())
            .collect();

        let mut inputs = ProofInputs::new();
        inputs
            .insert("encrypted_values", InputValue::List(encrypted_values))
            .insert("count", InputValue::integer(prepared.entries.len() as u64));
        insert_packed_key(&mut inputs, "packed_public_key", &prepared.account);
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
        prepared: &PreparedSettlement,
        proof: &Proof,
    ) -> Result<TxHandle> {
        ledger
            .process_pending_transfer(
                proof,
                &prepared.indexes,
                &prepared.process_fee_recipient,
                &prepared.account,
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
        testing::{create_account_with_amount, gen_keys, test_solver, InMemoryLedger, LedgerCall, ScriptedProver},
    };
    use rand::{rngs::StdRng, SeedableRng};

    const SEED_1: [u8; 32] = [42u8; 32];
    const SETTLER: &str = "0x4444444444444444444444444444444444444444";

    #[tokio::test]
    async fn single_entry_is_padded() {
        let curve = CurveEngine::new();
        let solver = test_solver(&curve);
        let mut rng = StdRng::from_seed(SEED_1);
        let ledger = InMemoryLedger::new();
        let prover = ScriptedProver::new();
        let bob = gen_keys(&curve, &mut rng);

        let (_, amount) = bob.public.encrypt_value(&curve, 25, &mut rng).unwrap();
        ledger.add_pending_transfer(&bob.public.pack(), &amount, 1);

        let op = ProcessTransfer::new(bob.public, 0, SETTLER);
        let mut coordinator = Coordinator::new(&curve, &ledger, &prover, op);
        coordinator.init().await.unwrap();
        assert_eq!(coordinator.prepared().unwrap().indexes, vec![0]);
        // Unfunded: the balance becomes the transfer itself.
        assert_eq!(coordinator.prepared().unwrap().new_balance, amount);

        coordinator.generate_proof().await.unwrap();
        let (circuit, inputs) = prover.requests().pop().unwrap();
        assert_eq!(circuit, "process_pending_transfers");
        let Some(InputValue::List(values)) = inputs.get("encrypted_values") else {
            panic!("missing encrypted_values");
        };
        assert_eq!(values.len(), 8);
        assert_eq!(values[0], InputValue::point(&amount.c1));
        assert_eq!(values[1], InputValue::point(&amount.c2));
        for value in &values[2..] {
            assert_eq!(*value, InputValue::zero_point());
        }

        coordinator.submit().await.unwrap();
        let stored = CipherText::try_from(ledger.balance(&bob.public.pack())).unwrap();
        assert_eq!(bob.secret.decrypt(&curve, &solver, &stored), Ok(25));
    }

    #[tokio::test]
    async fn settles_onto_existing_balance() {
        let curve = CurveEngine::new();
        let solver = test_solver(&curve);
        let mut rng = StdRng::from_seed(SEED_1);
        let ledger = InMemoryLedger::new();
        let prover = ScriptedProver::new();
        let (bob, balance) = create_account_with_amount(&curve, &mut rng, 100);
        ledger.set_balance(&bob.public.pack(), &balance);

        for (amount, fee) in [(1, 3), (2, 0), (3, 3), (4, 3), (5, 3), (6, 3)] {
            let (_, ct) = bob.public.encrypt_value(&curve, amount, &mut rng).unwrap();
            ledger.add_pending_transfer(&bob.public.pack(), &ct, fee);
        }

        let op = ProcessTransfer::new(bob.public, 1, SETTLER);
        let mut coordinator = Coordinator::new(&curve, &ledger, &prover, op);
        coordinator.run().await.unwrap();

        let prepared = coordinator.prepared().unwrap();
        assert_eq!(prepared.indexes, vec![0, 2, 3, 4]);
        assert_eq!(
            bob.secret.decrypt(&curve, &solver, &prepared.new_balance),
            Ok(100 + 1 + 3 + 4 + 5)
        );
        match ledger.calls().last() {
            Some(LedgerCall::ProcessPendingTransfer {
                indexes,
                process_fee_recipient,
                ..
            }) => {
                assert_eq!(indexes, &vec![0, 2, 3, 4]);
                assert_eq!(process_fee_recipient.to_string(), SETTLER);
            }
            other => panic!("expected a settlement call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nothing_qualifies() {
        let curve = CurveEngine::new();
        let mut rng = StdRng::from_seed(SEED_1);
        let ledger = InMemoryLedger::new();
        let prover = ScriptedProver::new();
        let bob = gen_keys(&curve, &mut rng);
        let (_, ct) = bob.public.encrypt_value(&curve, 3, &mut rng).unwrap();
        ledger.add_pending_transfer(&bob.public.pack(), &ct, 0);

        let op = ProcessTransfer::new(bob.public, 1, SETTLER);
        let mut coordinator = Coordinator::new(&curve, &ledger, &prover, op);
        assert_eq!(coordinator.init().await, Err(Error::NothingToProcess));

        let op = ProcessTransfer::new(bob.public, 0, "0x44");
        let mut coordinator = Coordinator::new(&curve, &ledger, &prover, op);
        assert!(matches!(
            coordinator.init().await,
            Err(Error::AddressValidationError { .. })
        ));
    }
}
