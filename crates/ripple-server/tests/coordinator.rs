//! Coordinator integration tests over an in-process kernel.

mod common;

use std::time::Duration;

use tokio::time::timeout;

use ripple_core::ipc::KernelCommand;
use ripple_core::notebook::{CellId, CellStatus, CellType, NotebookId};
use ripple_server::error::ApiError;
use ripple_server::protocol::NotebookEvent;
use ripple_server::registry::Registry;

use common::{alice, mallory, test_registry};

async fn open_fresh(
    registry: &Registry,
) -> (std::sync::Arc<ripple_server::coordinator::Coordinator>, NotebookId) {
    let id = registry.create_notebook(&alice(), None).await.unwrap();
    let coordinator = registry.open(&alice(), &id).await.unwrap();
    (coordinator, id)
}

async fn add_cell(
    coordinator: &ripple_server::coordinator::Coordinator,
    code: &str,
) -> CellId {
    coordinator
        .create_cell(&alice(), CellType::Python, code.to_string(), None, None)
        .await
        .unwrap()
        .cell_id
}

/// Poll until a cell reaches `status` (cascades keep running after
/// `run_cell(wait)` returns for the initial cell).
async fn wait_for_status(
    coordinator: &ripple_server::coordinator::Coordinator,
    cell_id: CellId,
    status: CellStatus,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = coordinator.get_state(&alice(), false, None).await.unwrap();
        let cell = state.cells.iter().find(|v| v.cell_id == cell_id).unwrap();
        if cell.status == status {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "cell {cell_id} never reached {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn simple_cascade_events_and_values() {
    let (registry, _) = test_registry();
    let (coordinator, _) = open_fresh(&registry).await;

    let a = add_cell(&coordinator, "x = 10").await;
    let b = add_cell(&coordinator, "y = x + 5").await;
    let c = add_cell(&coordinator, "z = y * 2").await;

    // Registration extracted variables.
    let state = coordinator.get_state(&alice(), false, None).await.unwrap();
    let cell_b = state.cells.iter().find(|v| v.cell_id == b).unwrap();
    assert_eq!(cell_b.reads.iter().collect::<Vec<_>>(), vec!["x"]);
    assert_eq!(cell_b.writes.iter().collect::<Vec<_>>(), vec!["y"]);

    let mut events = coordinator.subscribe();
    let result = coordinator.run_cell(&alice(), a, true).await.unwrap();
    assert_eq!(result.unwrap().status, CellStatus::Success);

    // Expected stream: running/success per cell in topological order.
    let mut status_events = Vec::new();
    while status_events.len() < 6 {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event stream stalled")
            .expect("subscription closed");
        if let NotebookEvent::CellStatus { cell_id, status } = event {
            status_events.push((cell_id, status));
        }
    }
    assert_eq!(
        status_events,
        vec![
            (a, CellStatus::Running),
            (a, CellStatus::Success),
            (b, CellStatus::Running),
            (b, CellStatus::Success),
            (c, CellStatus::Running),
            (c, CellStatus::Success),
        ]
    );

    // Final values flowed through the shared globals.
    let snapshot = coordinator
        .run_cell(&alice(), c, true)
        .await
        .unwrap()
        .unwrap();
    let outputs = snapshot.outputs.unwrap();
    assert!(outputs.is_empty(), "assignments produce no value output");

    let probe = add_cell(&coordinator, "z").await;
    let snapshot = coordinator
        .run_cell(&alice(), probe, true)
        .await
        .unwrap()
        .unwrap();
    let outputs = snapshot.outputs.unwrap();
    assert_eq!(outputs[0].data, serde_json::json!("30"));
}

#[tokio::test]
async fn error_halts_cascade_and_leaves_dependents_untouched() {
    let (registry, _) = test_registry();
    let (coordinator, _) = open_fresh(&registry).await;

    let a = add_cell(&coordinator, "x = 1/0").await;
    let b = add_cell(&coordinator, "y = x").await;

    let mut events = coordinator.subscribe();
    let snapshot = coordinator
        .run_cell(&alice(), a, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.status, CellStatus::Error);
    assert!(snapshot.error.unwrap().contains("ZeroDivision"));

    // b keeps its prior (idle) status.
    let state = coordinator.get_state(&alice(), false, None).await.unwrap();
    let cell_b = state.cells.iter().find(|v| v.cell_id == b).unwrap();
    assert_eq!(cell_b.status, CellStatus::Idle);

    // Event order for a: running, error text, terminal error status, then
    // the cascade completion; nothing at all for b.
    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event stream stalled")
            .expect("subscription closed");
        let done = matches!(event, NotebookEvent::CascadeComplete { .. });
        seen.push(event);
        if done {
            break;
        }
    }
    assert!(matches!(
        &seen[0],
        NotebookEvent::CellStatus { cell_id, status: CellStatus::Running } if *cell_id == a
    ));
    assert!(seen.iter().any(
        |e| matches!(e, NotebookEvent::CellError { cell_id, error } if *cell_id == a && error.contains("ZeroDivision"))
    ));
    assert!(seen.iter().all(|e| match e {
        NotebookEvent::CellStatus { cell_id, .. } => *cell_id == a,
        _ => true,
    }));
    assert!(matches!(
        seen.last(),
        Some(NotebookEvent::CascadeComplete {
            total_cells_executed: 1,
            ..
        })
    ));
}

#[tokio::test]
async fn cycle_update_commits_blocked_cell() {
    let (registry, _) = test_registry();
    let (coordinator, _) = open_fresh(&registry).await;

    let _a = add_cell(&coordinator, "x = y + 1").await;
    let b = add_cell(&coordinator, "y = 5").await;

    let before = coordinator.get_state(&alice(), false, None).await.unwrap();

    let result = coordinator
        .update_cell(&alice(), b, "y = x + 1".to_string(), None)
        .await;
    let Err(ApiError::Cycle { cell_id, error }) = result else {
        panic!("expected cycle report, got {result:?}");
    };
    assert_eq!(cell_id, b);
    assert!(error.contains("cyclic"));

    // The edit committed: new code, blocked status, bumped revision.
    let after = coordinator.get_state(&alice(), false, None).await.unwrap();
    let cell_b = after.cells.iter().find(|v| v.cell_id == b).unwrap();
    assert_eq!(cell_b.code, "y = x + 1");
    assert_eq!(cell_b.status, CellStatus::Blocked);
    assert!(cell_b.error.as_ref().unwrap().contains("cyclic"));
    assert_eq!(after.revision, before.revision + 1);

    // Running the blocked cell is refused outright.
    let run = coordinator.run_cell(&alice(), b, true).await;
    assert!(matches!(run, Err(ApiError::CellBlocked(_))));

    // Clearing the cycle unblocks.
    coordinator
        .update_cell(&alice(), b, "y = 5".to_string(), None)
        .await
        .unwrap();
    let state = coordinator.get_state(&alice(), false, None).await.unwrap();
    let cell_b = state.cells.iter().find(|v| v.cell_id == b).unwrap();
    assert_eq!(cell_b.status, CellStatus::Idle);
}

#[tokio::test]
async fn revision_conflict_rejects_second_writer() {
    let (registry, _) = test_registry();
    let (coordinator, _) = open_fresh(&registry).await;

    let a = add_cell(&coordinator, "x = 1").await;
    let b = add_cell(&coordinator, "q = 2").await;
    let state = coordinator.get_state(&alice(), false, None).await.unwrap();
    let revision = state.revision;

    // First writer commits at revision + 1.
    coordinator
        .update_cell(&alice(), a, "x = 2".to_string(), Some(revision))
        .await
        .unwrap();

    let mut events = coordinator.subscribe();

    // Second writer carried the stale expected revision.
    let result = coordinator
        .update_cell(&alice(), b, "q = 3".to_string(), Some(revision))
        .await;
    let Err(ApiError::Conflict { current_revision }) = result else {
        panic!("expected conflict, got {result:?}");
    };
    assert_eq!(current_revision, revision + 1);

    // No broadcast for the failed attempt, revision unchanged.
    assert!(timeout(Duration::from_millis(200), events.recv())
        .await
        .is_err());
    let state = coordinator.get_state(&alice(), false, None).await.unwrap();
    assert_eq!(state.revision, revision + 1);
    let cell_b = state.cells.iter().find(|v| v.cell_id == b).unwrap();
    assert_eq!(cell_b.code, "q = 2");
}

#[tokio::test]
async fn delete_leaves_dependents_stale() {
    let (registry, _) = test_registry();
    let (coordinator, _) = open_fresh(&registry).await;

    let a = add_cell(&coordinator, "x = 1").await;
    let b = add_cell(&coordinator, "y = x + 1").await;
    coordinator.run_cell(&alice(), a, true).await.unwrap();
    wait_for_status(&coordinator, b, CellStatus::Success).await;

    coordinator.delete_cell(&alice(), a, None).await.unwrap();

    let state = coordinator.get_state(&alice(), false, None).await.unwrap();
    assert_eq!(state.cells.len(), 1);
    // b was not re-run: it still shows its last successful state.
    let cell_b = state.cells.iter().find(|v| v.cell_id == b).unwrap();
    assert_eq!(cell_b.status, CellStatus::Success);

    // Positions reindexed.
    assert_eq!(cell_b.position, 0);
}

#[tokio::test]
async fn ownership_is_enforced() {
    let (registry, _) = test_registry();
    let (coordinator, id) = open_fresh(&registry).await;
    let a = add_cell(&coordinator, "x = 1").await;

    assert!(matches!(
        coordinator.get_state(&mallory(), false, None).await,
        Err(ApiError::Forbidden)
    ));
    assert!(matches!(
        coordinator
            .update_cell(&mallory(), a, "x = 2".to_string(), None)
            .await,
        Err(ApiError::Forbidden)
    ));
    assert!(matches!(
        coordinator.run_cell(&mallory(), a, false).await,
        Err(ApiError::Forbidden)
    ));

    // Loading by a non-owner doesn't even find the notebook.
    assert!(matches!(
        registry.open(&mallory(), &id).await,
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn update_missing_cell_is_not_found() {
    let (registry, _) = test_registry();
    let (coordinator, _) = open_fresh(&registry).await;
    let result = coordinator
        .update_cell(&alice(), CellId::new(), "x = 1".to_string(), None)
        .await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn kernel_death_fails_pending_and_subsequent_operations() {
    let (registry, control) = test_registry();
    let (coordinator, id) = open_fresh(&registry).await;
    let a = add_cell(&coordinator, "x = 1").await;

    let mut events = coordinator.subscribe();

    // Kill the kernel out from under the coordinator.
    let kill = control.lock().unwrap().clone().unwrap();
    kill.send(KernelCommand::Shutdown).unwrap();

    // Within a probe interval the kernel_error broadcast fires.
    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no kernel_error within probe interval")
        .unwrap();
    assert!(matches!(event, NotebookEvent::KernelError { .. }));

    // Mutations now fail until the coordinator is replaced.
    let result = coordinator
        .update_cell(&alice(), a, "x = 2".to_string(), None)
        .await;
    assert!(matches!(result, Err(ApiError::KernelDied(_))));

    // Reopening through the registry replaces the dead coordinator.
    let replacement = registry.open(&alice(), &id).await.unwrap();
    assert!(!replacement.is_dead());
    replacement
        .update_cell(&alice(), a, "x = 2".to_string(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn notebook_reload_preserves_cells_and_graph() {
    let (registry, _) = test_registry();
    let (coordinator, id) = open_fresh(&registry).await;

    let a = add_cell(&coordinator, "x = 10").await;
    let _b = add_cell(&coordinator, "y = x + 5").await;
    coordinator.run_cell(&alice(), a, true).await.unwrap();

    // Drop the live coordinator and reload from storage.
    registry.shutdown_notebook(&alice(), &id).await.unwrap();
    let reloaded = registry.open(&alice(), &id).await.unwrap();

    let state = reloaded.get_state(&alice(), true, None).await.unwrap();
    assert_eq!(state.cells.len(), 2);
    let cell_b = state.cells.iter().find(|v| v.code == "y = x + 5").unwrap();
    assert!(cell_b.reads.contains("x"));

    // The kernel was re-seeded from the persisted cells: running b works
    // after running a (globals were rebuilt by the new cascade).
    let snapshot = reloaded.run_cell(&alice(), a, true).await.unwrap().unwrap();
    assert_eq!(snapshot.status, CellStatus::Success);
}

#[tokio::test]
async fn provisioning_is_idempotent() {
    let (registry, _) = test_registry();

    let first = registry.list_notebooks(&alice()).await.unwrap();
    let second = registry.list_notebooks(&alice()).await.unwrap();

    let ids = |metas: &[ripple_core::notebook::NotebookMetadata]| -> Vec<String> {
        metas.iter().map(|m| m.id.0.clone()).collect()
    };
    assert_eq!(ids(&first), ids(&second));
    assert!(first.iter().any(|m| m.id.0 == "blank-alice"));
    assert!(first.iter().any(|m| m.id.0 == "demo-alice"));

    // Provisioned per caller.
    let other = registry.list_notebooks(&mallory()).await.unwrap();
    assert!(other.iter().any(|m| m.id.0 == "blank-mallory"));
    assert!(!other.iter().any(|m| m.id.0 == "blank-alice"));
}

#[tokio::test]
async fn legacy_ids_are_rewritten() {
    let (registry, _) = test_registry();
    registry.list_notebooks(&alice()).await.unwrap();

    let coordinator = registry
        .open(&alice(), &NotebookId::from("demo"))
        .await
        .unwrap();
    let state = coordinator.get_state(&alice(), false, None).await.unwrap();
    assert_eq!(state.id.0, "demo-alice");
}

#[tokio::test]
async fn demo_notebook_cascade_works_end_to_end() {
    let (registry, _) = test_registry();
    registry.list_notebooks(&alice()).await.unwrap();

    let coordinator = registry
        .open(&alice(), &NotebookId::from("demo"))
        .await
        .unwrap();
    let state = coordinator.get_state(&alice(), false, None).await.unwrap();
    let first = state.cells[0].cell_id;

    let snapshot = coordinator
        .run_cell(&alice(), first, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.status, CellStatus::Success);

    // The final demo cell produces a 2x2 table; previews reflect it.
    let last_id = state.cells.last().unwrap().cell_id;
    wait_for_status(&coordinator, last_id, CellStatus::Success).await;
    let state = coordinator.get_state(&alice(), false, None).await.unwrap();
    let last = state.cells.last().unwrap();
    assert_eq!(last.status, CellStatus::Success);
    let preview = last.preview.as_ref().unwrap();
    assert_eq!(preview.output_preview.as_deref(), Some("[2×2 table]"));
    assert_eq!(preview.output_type.as_deref(), Some("dataframe"));
    assert!(!preview.has_image);
}

#[tokio::test]
async fn sql_cell_runs_against_configured_database() {
    let (registry, _) = test_registry();
    let (coordinator, _) = open_fresh(&registry).await;

    coordinator
        .set_db_config(&alice(), "sqlite::memory:".to_string())
        .await
        .unwrap();

    let n = add_cell(&coordinator, "n = 3").await;
    let q = coordinator
        .create_cell(
            &alice(),
            CellType::Sql,
            "SELECT {n} AS tripled".to_string(),
            None,
            None,
        )
        .await
        .unwrap()
        .cell_id;

    coordinator.run_cell(&alice(), n, true).await.unwrap();
    wait_for_status(&coordinator, q, CellStatus::Success).await;

    let state = coordinator.get_state(&alice(), true, None).await.unwrap();
    let cell_q = state.cells.iter().find(|v| v.cell_id == q).unwrap();
    assert_eq!(cell_q.status, CellStatus::Success);
    let outputs = cell_q.outputs.as_ref().unwrap();
    assert_eq!(
        outputs[0].data,
        serde_json::json!({"columns": ["tripled"], "rows": [[3]]})
    );
}

#[tokio::test]
async fn invalid_db_config_is_rejected() {
    let (registry, _) = test_registry();
    let (coordinator, _) = open_fresh(&registry).await;
    let result = coordinator
        .set_db_config(&alice(), "sqlite:///no/such/dir/db.sqlite".to_string())
        .await;
    assert!(matches!(result, Err(ApiError::BadRequest(_))));
}

#[tokio::test]
async fn stdout_and_output_events_arrive_between_running_and_terminal() {
    let (registry, _) = test_registry();
    let (coordinator, _) = open_fresh(&registry).await;
    let a = add_cell(&coordinator, "print('hi')\n1 + 1").await;

    let mut events = coordinator.subscribe();
    coordinator.run_cell(&alice(), a, true).await.unwrap();

    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event stream stalled")
            .unwrap();
        let done = matches!(event, NotebookEvent::CascadeComplete { .. });
        seen.push(event);
        if done {
            break;
        }
    }

    let running = seen
        .iter()
        .position(|e| matches!(e, NotebookEvent::CellStatus { status: CellStatus::Running, .. }))
        .unwrap();
    let stdout = seen
        .iter()
        .position(|e| matches!(e, NotebookEvent::CellStdout { chunk, .. } if chunk == "hi\n"))
        .unwrap();
    let output = seen
        .iter()
        .position(|e| matches!(e, NotebookEvent::CellOutput { .. }))
        .unwrap();
    let terminal = seen
        .iter()
        .position(|e| matches!(e, NotebookEvent::CellStatus { status: CellStatus::Success, .. }))
        .unwrap();
    assert!(running < stdout);
    assert!(stdout < output);
    assert!(output < terminal);
}
