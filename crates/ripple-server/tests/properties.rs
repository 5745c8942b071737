//! Property tests for the coordinator's consistency invariants.

mod common;

use proptest::prelude::*;

use ripple_core::notebook::{CellStatus, CellType};
use ripple_server::error::ApiError;
use ripple_server::registry::Registry;

use common::{alice, test_registry};

/// Random mutation scripts over one notebook.
#[derive(Debug, Clone)]
enum Op {
    Create(String),
    Update(usize, String),
    Delete(usize),
}

fn small_code() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "x = 1", "y = x + 1", "z = y * 2", "w = 5", "x = w + 1", "total = x + z",
    ])
    .prop_map(str::to_string)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        small_code().prop_map(Op::Create),
        (0usize..4, small_code()).prop_map(|(i, code)| Op::Update(i, code)),
        (0usize..4).prop_map(Op::Delete),
    ]
}

async fn apply_ops(registry: &Registry, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let id = registry.create_notebook(&alice(), None).await.unwrap();
    let coordinator = registry.open(&alice(), &id).await.unwrap();

    let mut revision = coordinator
        .get_state(&alice(), false, None)
        .await
        .unwrap()
        .revision;

    for op in ops {
        let state = coordinator.get_state(&alice(), false, None).await.unwrap();
        let result = match op {
            Op::Create(code) => coordinator
                .create_cell(&alice(), CellType::Python, code, None, None)
                .await
                .map(|_| ()),
            Op::Update(i, code) => match state.cells.get(i) {
                Some(cell) => coordinator
                    .update_cell(&alice(), cell.cell_id, code, None)
                    .await
                    .map(|_| ()),
                None => continue,
            },
            Op::Delete(i) => match state.cells.get(i) {
                Some(cell) => coordinator.delete_cell(&alice(), cell.cell_id, None).await,
                None => continue,
            },
        };

        let current = coordinator
            .get_state(&alice(), false, None)
            .await
            .unwrap()
            .revision;
        match result {
            // Every successful mutation (and a committed-but-blocked cycle
            // edit) bumps the revision by exactly one.
            Ok(()) | Err(ApiError::Cycle { .. }) => {
                prop_assert_eq!(current, revision + 1, "revision must increment by one");
            }
            Err(_) => {
                prop_assert_eq!(current, revision, "failed ops must not move the revision");
            }
        }
        prop_assert!(current >= revision, "revision is non-decreasing");
        revision = current;

        // Every cell's blocked flag matches cycle participation: a blocked
        // cell can never run, an unblocked one can at least be scheduled.
        let state = coordinator.get_state(&alice(), false, None).await.unwrap();
        for cell in &state.cells {
            if cell.status == CellStatus::Blocked {
                let run = coordinator.run_cell(&alice(), cell.cell_id, false).await;
                prop_assert!(matches!(run, Err(ApiError::CellBlocked(_))));
            }
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Revision strictly increases per successful mutation, never moves on
    /// failures, and blocked cells are exactly the ones that refuse to run.
    #[test]
    fn revision_discipline_under_random_mutations(ops in prop::collection::vec(op(), 1..8)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let (registry, _) = test_registry();
        runtime.block_on(apply_ops(&registry, ops))?;
    }

    /// Optimistic locking: with a stale expected revision the operation
    /// fails with Conflict and the revision stays put; with the current
    /// one it commits at exactly `expected + 1`.
    #[test]
    fn expected_revision_commits_or_conflicts(stale_offset in 1u64..5) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let (registry, _) = test_registry();
        runtime.block_on(async {
            let id = registry.create_notebook(&alice(), None).await.unwrap();
            let coordinator = registry.open(&alice(), &id).await.unwrap();
            let cell = coordinator
                .create_cell(&alice(), CellType::Python, "x = 1".into(), None, None)
                .await
                .unwrap()
                .cell_id;
            let revision = coordinator
                .get_state(&alice(), false, None)
                .await
                .unwrap()
                .revision;

            // Stale expectation: conflict, revision untouched.
            let result = coordinator
                .update_cell(
                    &alice(),
                    cell,
                    "x = 2".into(),
                    Some(revision + stale_offset),
                )
                .await;
            let is_expected_conflict =
                matches!(result, Err(ApiError::Conflict { current_revision }) if current_revision == revision);
            prop_assert!(is_expected_conflict);
            let current = coordinator
                .get_state(&alice(), false, None)
                .await
                .unwrap()
                .revision;
            prop_assert_eq!(current, revision);

            // Matching expectation: commits at exactly revision + 1.
            coordinator
                .update_cell(&alice(), cell, "x = 3".into(), Some(revision))
                .await
                .unwrap();
            let current = coordinator
                .get_state(&alice(), false, None)
                .await
                .unwrap()
                .revision;
            prop_assert_eq!(current, revision + 1);

            coordinator.shutdown().await;
            Ok(())
        })?;
    }
}
