//! Deposit, settle, transfer, settle, withdraw: one account pair end to end.

use confidential_balance::{
    stage_deposit,
    testing::{self, InMemoryLedger, LedgerCall, ScriptedProver},
    CipherText, Coordinator, CurveEngine, DiscreteLogSolver, ElgamalKeys, Error, ProcessDeposit,
    ProcessTransfer, ScalarSource, Transfer, Withdrawal,
};
use rand::{rngs::StdRng, SeedableRng};

const RELAYER: &str = "0x00000000000000000000000000000000000000aa";
const EXIT: &str = "0x00000000000000000000000000000000000000bb";

fn stored_balance<S: DiscreteLogSolver>(
    curve: &CurveEngine,
    solver: &S,
    ledger: &InMemoryLedger,
    keys: &ElgamalKeys,
) -> u64 {
    let stored = ledger.balance(&keys.public.pack());
    if stored.is_zero() {
        return 0;
    }
    let ct = CipherText::try_from(stored).expect("valid ciphertext");
    keys.secret.decrypt(curve, solver, &ct).expect("in range")
}

#[tokio::test]
async fn full_flow() {
    let curve = CurveEngine::new();
    let solver = testing::test_solver(&curve);
    let mut rng = StdRng::from_seed([7u8; 32]);
    let ledger = InMemoryLedger::new();
    let prover = ScriptedProver::new();

    let alice = testing::gen_keys(&curve, &mut rng);
    let bob = testing::gen_keys(&curve, &mut rng);

    // Alice deposits twice and a relayer settles both.
    stage_deposit(&ledger, 1_000, &alice.public, 2).await.unwrap();
    stage_deposit(&ledger, 500, &alice.public, 2).await.unwrap();
    let settle = ProcessDeposit::new(alice.public, 1, RELAYER, ScalarSource::Secure);
    Coordinator::new(&curve, &ledger, &prover, settle)
        .run()
        .await
        .unwrap();
    assert_eq!(stored_balance(&curve, &solver, &ledger, &alice), 1_500);

    // Bob has never been funded, so the process fee is waived.
    let transfer = Transfer::new(&alice, &solver, bob.public.pack(), 600, ScalarSource::Secure)
        .with_relay_fee(10, RELAYER)
        .with_process_fee(5);
    Coordinator::new(&curve, &ledger, &prover, transfer)
        .run()
        .await
        .unwrap();
    assert_eq!(stored_balance(&curve, &solver, &ledger, &alice), 890);
    assert_eq!(stored_balance(&curve, &solver, &ledger, &bob), 0);

    // Bob settles the staged transfer.
    let settle = ProcessTransfer::new(bob.public, 0, RELAYER);
    Coordinator::new(&curve, &ledger, &prover, settle)
        .run()
        .await
        .unwrap();
    assert_eq!(stored_balance(&curve, &solver, &ledger, &bob), 600);

    // A second transfer now pays the process fee.
    let transfer = Transfer::new(&alice, &solver, bob.public.pack(), 90, ScalarSource::Secure)
        .with_process_fee(5);
    Coordinator::new(&curve, &ledger, &prover, transfer)
        .run()
        .await
        .unwrap();
    assert_eq!(stored_balance(&curve, &solver, &ledger, &alice), 795);
    let settle = ProcessTransfer::new(bob.public, 5, RELAYER);
    Coordinator::new(&curve, &ledger, &prover, settle)
        .run()
        .await
        .unwrap();
    assert_eq!(stored_balance(&curve, &solver, &ledger, &bob), 690);

    // Bob withdraws part of it.
    let withdrawal = Withdrawal::new(&bob, &solver, EXIT, 400, ScalarSource::Secure)
        .with_relay_fee(3, RELAYER);
    Coordinator::new(&curve, &ledger, &prover, withdrawal)
        .run()
        .await
        .unwrap();
    assert_eq!(stored_balance(&curve, &solver, &ledger, &bob), 287);

    let fees: Vec<_> = ledger
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            LedgerCall::Transfer { process_fee, .. } => Some(process_fee),
            _ => None,
        })
        .collect();
    assert_eq!(fees, vec![0, 5]);

    let circuits: Vec<_> = prover.requests().into_iter().map(|(c, _)| c).collect();
    assert_eq!(
        circuits,
        vec![
            "process_pending_deposits",
            "transfer",
            "process_pending_transfers",
            "transfer",
            "process_pending_transfers",
            "withdraw",
        ]
    );

    // Everything pending has been consumed.
    let settle = ProcessTransfer::new(bob.public, 0, RELAYER);
    assert_eq!(
        Coordinator::new(&curve, &ledger, &prover, settle).run().await,
        Err(Error::NothingToProcess)
    );
}

#[tokio::test]
async fn resubmit_after_revert() {
    let curve = CurveEngine::new();
    let solver = testing::test_solver(&curve);
    let mut rng = StdRng::from_seed([8u8; 32]);
    let ledger = InMemoryLedger::new();
    let prover = ScriptedProver::new();
    let alice = testing::gen_keys(&curve, &mut rng);

    stage_deposit(&ledger, 42, &alice.public, 0).await.unwrap();
    let settle = ProcessDeposit::new(alice.public, 0, RELAYER, ScalarSource::Secure);
    let mut coordinator = Coordinator::new(&curve, &ledger, &prover, settle);
    coordinator.init().await.unwrap();
    coordinator.generate_proof().await.unwrap();

    ledger.fail_next_write("execution reverted");
    assert!(matches!(
        coordinator.submit().await,
        Err(Error::ChainCallError(_))
    ));
    assert_eq!(stored_balance(&curve, &solver, &ledger, &alice), 0);

    coordinator.submit().await.unwrap();
    assert_eq!(prover.requests().len(), 1);
    assert_eq!(stored_balance(&curve, &solver, &ledger, &alice), 42);
}
