use std::sync::{Arc, Mutex};

use anyhow::Result;
use fxp_kernel::{
    Action, Block, ChangeSet, CheckPattern, Checker, EvalConfig, Evaluation, FixpointCallback,
    InsertFact, KernelError, MemoryDatabase, RemoveFact, SharedDatabase,
};
use fxp_store::{MultiIndex, Pattern, Quad};
use fxp_value::Scalar;

fn insert(db: &str, e: &str, a: &str, v: impl Into<Scalar>, n: &str) -> Box<dyn Action> {
    Box::new(InsertFact::new(db, e, a, v, n))
}

fn remove(db: &str, e: &str, a: &str, v: impl Into<Scalar>, n: &str) -> Box<dyn Action> {
    Box::new(RemoveFact::new(db, e, a, v, n))
}

fn triples(eval: &Evaluation, name: &str) -> Vec<Quad> {
    eval.database(name).unwrap().read().unwrap().to_triples()
}

/// Captures `(round, changed)` from the final change set.
fn capture_outcome() -> (Arc<Mutex<Option<(u64, bool)>>>, FixpointCallback) {
    let slot = Arc::new(Mutex::new(None));
    let writer = Arc::clone(&slot);
    let callback: FixpointCallback = Box::new(move |changes: &ChangeSet| {
        *writer.lock().unwrap() = Some((changes.round(), changes.changed()));
    });
    (slot, callback)
}

#[test]
fn single_fact_insertion_reaches_fixpoint_in_one_round() -> Result<()> {
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::new("main").shared())?;

    let (outcome, callback) = capture_outcome();
    eval.execute_actions(
        vec![insert("main", "e1", "tag", "person", "n1")],
        None,
        Some(callback),
    )?;

    assert_eq!(
        triples(&eval, "main"),
        vec![Quad::new("e1", "tag", "person", "n1")]
    );
    let (round, changed) = outcome.lock().unwrap().expect("callback ran");
    assert_eq!(round, 1);
    assert!(!changed);

    let snapshot = eval.save()?;
    assert_eq!(snapshot.0["main"].len(), 1);
    Ok(())
}

#[test]
fn trivial_derivation_runs_one_extra_round() -> Result<()> {
    let derive = Block::local(
        "derive-kind",
        Checker::patterns([CheckPattern::new("person")]),
        |multi: &MultiIndex, changes: &mut ChangeSet| -> anyhow::Result<()> {
            let index = multi.get("main").unwrap();
            let index = index.read().unwrap();
            for quad in index.iterate(&Pattern {
                e: None,
                a: Some("tag".into()),
                v: Some("person".into()),
            }) {
                changes.store("main", quad.e.clone(), "kind", "human", "n2");
            }
            Ok(())
        },
    );
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::with_blocks("main", [Arc::new(derive)]).shared())?;

    let (outcome, callback) = capture_outcome();
    eval.execute_actions(
        vec![insert("main", "e1", "tag", "person", "n1")],
        None,
        Some(callback),
    )?;

    let facts = triples(&eval, "main");
    assert_eq!(facts.len(), 2);
    assert!(facts.contains(&Quad::new("e1", "tag", "person", "n1")));
    assert!(facts.contains(&Quad::new("e1", "kind", "human", "n2")));

    let (round, changed) = outcome.lock().unwrap().expect("callback ran");
    assert_eq!(round, 2);
    assert!(!changed);
    Ok(())
}

fn counter_block() -> Block {
    Block::local(
        "increment",
        Checker::Always,
        |multi: &MultiIndex, changes: &mut ChangeSet| -> anyhow::Result<()> {
            let index = multi.get("main").unwrap();
            let index = index.read().unwrap();
            for quad in index.iterate(&Pattern::bind_ea("e1", "n")) {
                if let Scalar::Int(k) = quad.v {
                    changes.unstore("main", "e1", "n", k, "n1");
                    changes.store("main", "e1", "n", k + 1, "n1");
                }
            }
            Ok(())
        },
    )
}

#[test]
fn divergent_program_hits_the_round_cap() -> Result<()> {
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::with_blocks("main", [Arc::new(counter_block())]).shared())?;

    let reported: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    eval.set_error_reporter(Box::new(move |kind, message| {
        sink.lock().unwrap().push((kind.to_owned(), message.to_owned()));
    }));

    let (outcome, callback) = capture_outcome();
    eval.execute_actions(
        vec![insert("main", "e1", "n", 0i64, "n1")],
        None,
        Some(callback),
    )?;

    let reports = reported.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "Fixpoint Error");

    let (round, changed) = outcome.lock().unwrap().expect("callback still runs");
    assert_eq!(round, 300);
    assert!(changed);

    assert_eq!(triples(&eval, "main"), vec![Quad::new("e1", "n", 300i64, "n1")]);
    assert!(!eval.is_active());
    Ok(())
}

#[test]
fn shortened_round_cap_is_honored() -> Result<()> {
    let mut eval = Evaluation::with_config(EvalConfig {
        max_rounds: 5,
        ..EvalConfig::default()
    });
    eval.register_database(MemoryDatabase::with_blocks("main", [Arc::new(counter_block())]).shared())?;
    eval.set_error_reporter(Box::new(|_, _| {}));

    eval.execute_actions(vec![insert("main", "e1", "n", 0i64, "n1")], None, None)?;
    assert_eq!(triples(&eval, "main"), vec![Quad::new("e1", "n", 5i64, "n1")]);
    Ok(())
}

#[test]
fn commit_propagates_to_peer_evaluation() -> Result<()> {
    let shared: SharedDatabase = MemoryDatabase::new("shared").shared();
    let mut e1 = Evaluation::new();
    let mut e2 = Evaluation::new();
    e1.register_database(Arc::clone(&shared))?;
    e2.register_database(Arc::clone(&shared))?;

    e1.execute_actions(vec![insert("shared", "e1", "tag", "t", "n1")], None, None)?;

    assert_eq!(e2.pending(), 1);
    e2.drain()?;
    assert_eq!(e2.pending(), 0);

    let facts = triples(&e2, "shared");
    assert_eq!(facts, vec![Quad::new("e1", "tag", "t", "n1")]);
    assert_eq!(triples(&e1, "shared"), facts);
    // No echo back to the originator.
    assert_eq!(e1.pending(), 0);
    Ok(())
}

#[test]
fn commit_replay_activates_peer_blocks() -> Result<()> {
    let shared: SharedDatabase = MemoryDatabase::new("shared").shared();
    let mut e1 = Evaluation::new();
    e1.register_database(Arc::clone(&shared))?;

    let react = Block::local(
        "mirror",
        Checker::patterns([CheckPattern::new("t")]),
        |multi: &MultiIndex, changes: &mut ChangeSet| -> anyhow::Result<()> {
            let index = multi.get("shared").unwrap();
            let index = index.read().unwrap();
            for quad in index.iterate(&Pattern::bind_a("tag")) {
                changes.store("local", quad.e.clone(), "seen", true, "mirror");
            }
            Ok(())
        },
    );
    let mut e2 = Evaluation::new();
    e2.register_database(Arc::clone(&shared))?;
    e2.register_database(MemoryDatabase::with_blocks("local", [Arc::new(react)]).shared())?;

    e1.execute_actions(vec![insert("shared", "e1", "tag", "t", "n1")], None, None)?;
    e2.drain()?;

    assert_eq!(
        triples(&e2, "local"),
        vec![Quad::new("e1", "seen", true, "mirror")]
    );
    Ok(())
}

#[test]
fn remote_block_parks_and_resumes_the_fixpoint() -> Result<()> {
    let fetch = Block::remote(
        "fetch",
        Checker::patterns([CheckPattern::new("seed")]),
        |_multi: &MultiIndex, _changes: &mut ChangeSet| -> anyhow::Result<()> { Ok(()) },
    );
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::with_blocks("main", [Arc::new(fetch)]).shared())?;

    let (outcome, callback) = capture_outcome();
    eval.execute_actions(
        vec![insert("main", "e1", "tag", "seed", "n1")],
        None,
        Some(callback),
    )?;

    assert!(eval.is_active());
    assert_eq!(eval.awaiting(), 1);
    assert_eq!(eval.round(), Some(1));
    assert!(outcome.lock().unwrap().is_none());

    let mut derived = ChangeSet::new();
    derived.store("main", "e2", "result", "ok", "fetch");
    eval.on_remote_changes("fetch", derived)?;

    assert!(!eval.is_active());
    assert_eq!(eval.awaiting(), 0);
    let (round, changed) = outcome.lock().unwrap().expect("fixpoint completed");
    assert_eq!(round, 2);
    assert!(!changed);

    let facts = triples(&eval, "main");
    assert!(facts.contains(&Quad::new("e2", "result", "ok", "fetch")));
    Ok(())
}

#[test]
fn remote_response_without_active_item_is_rejected() {
    let mut eval = Evaluation::new();
    let err = eval
        .on_remote_changes("ghost", ChangeSet::new())
        .unwrap_err();
    assert!(matches!(err, KernelError::NoActiveEvaluation));
}

#[test]
fn remote_response_for_unawaited_block_is_rejected() -> Result<()> {
    let fetch = Block::remote(
        "fetch",
        Checker::patterns([CheckPattern::new("seed")]),
        |_multi: &MultiIndex, _changes: &mut ChangeSet| -> anyhow::Result<()> { Ok(()) },
    );
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::with_blocks("main", [Arc::new(fetch)]).shared())?;
    eval.execute_actions(vec![insert("main", "e1", "tag", "seed", "n1")], None, None)?;
    assert!(eval.is_active());

    let err = eval
        .on_remote_changes("other", ChangeSet::new())
        .unwrap_err();
    assert!(matches!(err, KernelError::UnexpectedRemoteResponse(id) if id == "other"));
    // Still parked on the real block.
    assert!(eval.is_active());
    assert_eq!(eval.awaiting(), 1);
    Ok(())
}

#[test]
fn provenance_survives_removal_of_one_producer() -> Result<()> {
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::new("main").shared())?;

    eval.execute_actions(
        vec![
            insert("main", "e1", "a", "v", "n1"),
            insert("main", "e1", "a", "v", "n2"),
        ],
        None,
        None,
    )?;
    eval.execute_actions(vec![remove("main", "e1", "a", "v", "n1")], None, None)?;
    assert_eq!(triples(&eval, "main"), vec![Quad::new("e1", "a", "v", "n2")]);

    eval.execute_actions(vec![remove("main", "e1", "a", "v", "n2")], None, None)?;
    assert!(triples(&eval, "main").is_empty());
    Ok(())
}

#[test]
fn duplicate_database_registration_is_rejected() -> Result<()> {
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::new("main").shared())?;
    let err = eval
        .register_database(MemoryDatabase::new("main").shared())
        .unwrap_err();
    assert!(matches!(err, KernelError::DuplicateDatabase(name) if name == "main"));
    Ok(())
}

#[test]
fn unregistering_unknown_database_is_rejected() {
    let mut eval = Evaluation::new();
    let err = eval.unregister_database("ghost").unwrap_err();
    assert!(matches!(err, KernelError::UnknownDatabase(name) if name == "ghost"));
}

#[test]
fn failing_block_aborts_the_item_but_not_the_evaluation() -> Result<()> {
    let broken = Block::local(
        "broken",
        Checker::Always,
        |_multi: &MultiIndex, _changes: &mut ChangeSet| -> anyhow::Result<()> {
            Err(anyhow::anyhow!("boom"))
        },
    );
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::with_blocks("main", [Arc::new(broken)]).shared())?;

    let err = eval
        .execute_actions(vec![insert("main", "e1", "tag", "t", "n1")], None, None)
        .unwrap_err();
    assert!(matches!(&err, KernelError::Block { id, .. } if id == "broken"));
    assert!(!eval.is_active());

    // The seed commit of the failed item survives; later items proceed.
    eval.execute_actions(vec![remove("main", "e1", "tag", "t", "n1")], None, None)
        .unwrap_err();
    Ok(())
}

#[test]
fn dormant_blocks_never_activate() -> Result<()> {
    let dormant = Block::local(
        "dormant",
        Checker::Always,
        |_multi: &MultiIndex, changes: &mut ChangeSet| -> anyhow::Result<()> {
            changes.store("main", "e9", "ran", true, "dormant");
            Ok(())
        },
    )
    .with_dormant(true);
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::with_blocks("main", [Arc::new(dormant)]).shared())?;

    eval.execute_actions(vec![insert("main", "e1", "tag", "t", "n1")], None, None)?;
    assert_eq!(triples(&eval, "main"), vec![Quad::new("e1", "tag", "t", "n1")]);
    Ok(())
}

#[test]
fn non_executing_database_contributes_no_blocks() -> Result<()> {
    let eager = Block::local(
        "eager",
        Checker::Always,
        |_multi: &MultiIndex, changes: &mut ChangeSet| -> anyhow::Result<()> {
            changes.store("main", "e9", "ran", true, "eager");
            Ok(())
        },
    );
    let mut eval = Evaluation::new();
    eval.register_database(
        MemoryDatabase::with_blocks("main", [Arc::new(eager)])
            .with_non_executing(true)
            .shared(),
    )?;

    eval.execute_actions(vec![insert("main", "e1", "tag", "t", "n1")], None, None)?;
    assert_eq!(triples(&eval, "main"), vec![Quad::new("e1", "tag", "t", "n1")]);
    Ok(())
}

#[test]
fn divergence_still_notifies_peers() -> Result<()> {
    let shared: SharedDatabase =
        MemoryDatabase::with_blocks("shared", [Arc::new(counter_increment_on_shared())]).shared();
    let mut e1 = Evaluation::with_config(EvalConfig {
        max_rounds: 3,
        ..EvalConfig::default()
    });
    let mut e2 = Evaluation::new();
    e1.register_database(Arc::clone(&shared))?;
    e2.register_database(Arc::clone(&shared))?;
    e1.set_error_reporter(Box::new(|_, _| {}));

    e1.execute_actions(vec![insert("shared", "e1", "n", 0i64, "n1")], None, None)?;
    // The partially committed state still fans out.
    assert_eq!(e2.pending(), 1);
    Ok(())
}

fn counter_increment_on_shared() -> Block {
    Block::local(
        "increment",
        Checker::Always,
        |multi: &MultiIndex, changes: &mut ChangeSet| -> anyhow::Result<()> {
            let index = multi.get("shared").unwrap();
            let index = index.read().unwrap();
            for quad in index.iterate(&Pattern::bind_ea("e1", "n")) {
                if let Scalar::Int(k) = quad.v {
                    changes.unstore("shared", "e1", "n", k, "n1");
                    changes.store("shared", "e1", "n", k + 1, "n1");
                }
            }
            Ok(())
        },
    )
}

#[test]
fn work_items_run_in_enqueue_order() -> Result<()> {
    let mut eval = Evaluation::new();
    eval.register_database(MemoryDatabase::new("main").shared())?;

    let order: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    for label in [1u64, 2, 3] {
        let sink = Arc::clone(&order);
        eval.execute_actions(
            vec![insert("main", "e1", "seq", label as i64, "n1")],
            None,
            Some(Box::new(move |_changes: &ChangeSet| {
                sink.lock().unwrap().push(label);
            })),
        )?;
    }
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    Ok(())
}

#[test]
fn perf_counters_record_block_executions() -> Result<()> {
    let derive = Block::local(
        "derive",
        Checker::patterns([CheckPattern::new("person")]),
        |_multi: &MultiIndex, _changes: &mut ChangeSet| -> anyhow::Result<()> { Ok(()) },
    );
    let mut eval = Evaluation::with_config(EvalConfig {
        perf: true,
        ..EvalConfig::default()
    });
    eval.register_database(MemoryDatabase::with_blocks("main", [Arc::new(derive)]).shared())?;
    eval.execute_actions(vec![insert("main", "e1", "tag", "person", "n1")], None, None)?;

    let report = eval.perf_report().expect("perf enabled");
    assert_eq!(report.fixpoints, 1);
    assert_eq!(report.rounds, 1);
    assert_eq!(report.blocks["derive"].calls, 1);
    Ok(())
}
