#![cfg(unix)]


use sim_core::{CompletionStatus, JobGroup, SessionEventKind};
use sim_domain::{EventId, Model, SimulationEvent};
use simflow_rust::{AppConfig, AppError, SolveRequest, SolveSession};
use test_support::Workspace;

#[tokio::test]
async fn solve_reduces_then_runs_solver() {
    let ws = Workspace::new(&["arm"]);
    let mut session = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();

    let summary = session.solve(&SolveRequest::default()).await.unwrap();
    assert!(summary.succeeded(), "{summary:?}");
    assert_eq!(summary.completions.len(), 1);
    assert_eq!(summary.completions[0].status, CompletionStatus::Succeeded);
    assert_eq!(summary.completions[0].group, JobGroup::DynamicsSolver);

    let part = &session.model().parts[0];
    assert_eq!(part.result_files.task_dir.as_deref(), Some("arm_1"));
    assert!(ws.root().join("link_DB/arm/arm_1/arm.chk").exists());
    assert!(ws.root().join("link_DB/arm/arm_1/arm_S.fmx").exists());
    assert!(ws.root().join("results/response_0001/th_p_1.frs").exists());
    assert!(!session.model().master_results.files.is_empty());
    assert_eq!((ws.reducer_runs(), ws.solver_runs()), (1, 1));
}

#[tokio::test]
async fn second_solve_reuses_reduction() {
    let ws = Workspace::new(&["arm", "boom"]);
    let mut session = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();

    assert!(session.solve(&SolveRequest::default()).await.unwrap().succeeded());
    assert_eq!(ws.reducer_runs(), 2);

    let summary = session.solve(&SolveRequest::default()).await.unwrap();
    assert!(summary.succeeded());
    assert_eq!(ws.reducer_runs(), 2);
    assert_eq!(ws.solver_runs(), 2);
    assert!(ws.root().join("results/response_0002/th_p_1.frs").exists());
}

#[tokio::test]
async fn fresh_session_finds_previous_reduction_on_disk() {
    let ws = Workspace::new(&["arm"]);
    let mut first = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();
    assert!(first.solve(&SolveRequest::default()).await.unwrap().succeeded());

    // el modelo en disco pierde el task dir: se encuentra escaneando
    let mut model = Model::load(&ws.model_path).unwrap();
    model.parts[0].result_files.clear();
    model.save(&ws.model_path).unwrap();

    let mut second = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();
    assert!(second.model().parts[0].result_files.task_dir.is_none());
    assert!(second.solve(&SolveRequest::default()).await.unwrap().succeeded());
    assert_eq!(ws.reducer_runs(), 1);
    assert_eq!(second.model().parts[0].result_files.task_dir.as_deref(), Some("arm_1"));
    assert!(second.registry()
                  .events()
                  .iter()
                  .any(|e| matches!(&e.kind, SessionEventKind::CacheHit { task_dir, .. } if task_dir == "arm_1")));
}

#[tokio::test]
async fn failing_solver_is_reported() {
    let ws = Workspace::with_exit_codes(&["arm"], 0, 2);
    let mut session = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();

    let summary = session.solve(&SolveRequest::default()).await.unwrap();
    assert!(!summary.succeeded());
    let done = &summary.completions[0];
    assert_eq!(done.status, CompletionStatus::Failed);
    assert!(done.diagnostic.as_deref().unwrap_or_default().contains("exit code 2"));
}

#[tokio::test]
async fn failing_reducer_blocks_solver_without_retry() {
    let ws = Workspace::with_exit_codes(&["arm"], 1, 0);
    let mut session = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();

    let summary = session.solve(&SolveRequest::default()).await.unwrap();
    assert_eq!(summary.completions[0].status, CompletionStatus::NotExecutable);
    assert!(!summary.stalled);
    assert_eq!((ws.reducer_runs(), ws.solver_runs()), (1, 0));

    // misma sesión: la parte fallida no se relanza
    session.solve(&SolveRequest::default()).await.unwrap();
    assert_eq!(ws.reducer_runs(), 1);

    session.registry_mut().clear_failures();
    session.solve(&SolveRequest::default()).await.unwrap();
    assert_eq!(ws.reducer_runs(), 2);
}

#[tokio::test]
async fn missing_binary_is_not_executable() {
    let ws = Workspace::new(&["arm"]);
    let config = AppConfig { reducer_bin: ws.root().join("bin/nope").display().to_string(),
                             ..ws.config.clone() };
    let mut session = SolveSession::open(&ws.model_path, config).unwrap();

    let summary = session.solve(&SolveRequest::default()).await.unwrap();
    assert_eq!(summary.completions[0].status, CompletionStatus::NotExecutable);
    assert_eq!(ws.solver_runs(), 0);
}

#[tokio::test]
async fn batch_mode_prepares_inputs_only() {
    let ws = Workspace::new(&["arm"]);
    let mut session = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();

    let summary = session.solve(&SolveRequest { batch: true,
                                                ..SolveRequest::default() })
                         .await
                         .unwrap();
    assert!(summary.succeeded());
    assert_eq!(summary.completions[0].status, CompletionStatus::Prepared);
    assert_eq!(summary.batch_prepared, vec![JobGroup::Reducer, JobGroup::DynamicsSolver]);
    assert_eq!((ws.reducer_runs(), ws.solver_runs()), (0, 0));
    assert!(ws.root().join("link_DB/arm/arm_1/fedem_reducer.fco").exists());
    assert!(ws.root().join("results/response_0001/crane.fsi").exists());
}

#[tokio::test]
async fn recovery_reduces_every_part() {
    let ws = Workspace::new(&["arm", "boom"]);
    let mut session = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();

    let summary = session.solve(&SolveRequest { recovery: true,
                                                ..SolveRequest::default() })
                         .await
                         .unwrap();
    assert!(summary.succeeded(), "{summary:?}");
    assert_eq!(summary.completions.len(), 2);
    assert!(summary.completions.iter().all(|c| c.group == JobGroup::Reducer));
    assert_eq!((ws.reducer_runs(), ws.solver_runs()), (2, 0));
}

#[tokio::test]
async fn event_solve_writes_into_event_directory() {
    let ws = Workspace::new(&["arm"]);
    let mut model = Model::load(&ws.model_path).unwrap();
    model.events.push(SimulationEvent::new(3, "gust", "events/gust"));
    model.save(&ws.model_path).unwrap();
    let mut session = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();

    let summary = session.solve(&SolveRequest { event: Some(EventId(3)),
                                                ..SolveRequest::default() })
                         .await
                         .unwrap();
    assert!(summary.succeeded(), "{summary:?}");
    assert!(ws.root().join("events/gust/results/response_0001/th_p_1.frs").exists());
    assert!(session.model().master_results.files.is_empty());
}

#[tokio::test]
async fn unknown_event_is_an_error() {
    let ws = Workspace::new(&["arm"]);
    let mut session = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();
    let err = session.solve(&SolveRequest { event: Some(EventId(42)),
                                            ..SolveRequest::default() })
                     .await
                     .unwrap_err();
    assert!(matches!(err, AppError::Orchestration(_)));
}

#[tokio::test]
async fn event_log_is_written_as_json_lines() {
    let ws = Workspace::new(&["arm"]);
    let log = ws.root().join("logs/session.jsonl");
    let config = AppConfig { event_log: Some(log.clone()),
                             ..ws.config.clone() };
    let mut session = SolveSession::open(&ws.model_path, config).unwrap();
    session.solve(&SolveRequest::default()).await.unwrap();

    let events = sim_adapters::JsonlEventStore::read_all(&log).unwrap();
    assert_eq!(events.len(), session.registry().events().len());
    assert!(events.iter().any(|e| matches!(e.kind, SessionEventKind::JobStarted { group: JobGroup::Reducer, .. })));
}

#[test]
fn check_reports_inconsistent_model() {
    let ws = Workspace::new(&["arm", "arm"]);
    let session = SolveSession::open(&ws.model_path, ws.config.clone()).unwrap();
    match session.check() {
        Err(AppError::Inconsistent(problems)) => {
            assert!(problems.iter().any(|p| p.contains("shares its result location")));
        }
        other => panic!("unexpected {other:?}"),
    }
}
