
use std::fs;
use std::path::PathBuf;

use sim_core::{ChecksumSidecar, ChecksumValidator, CompletionStatus, DependencyOutcome, Job, JobGroup, LeniencyPolicy,
               ProcessExit, ProcessScheduler, ReductionJob, SessionEventKind};
use sim_domain::{ExternalMatrices, LockLevel, MatrixKind, PartId, ReductionPurpose};
use test_support::Harness;

fn check(h: &mut Harness, purpose: ReductionPurpose) -> DependencyOutcome {
    let mut env = h.env();
    let mut job = ReductionJob::new(PartId(1), purpose, &mut env).unwrap();
    job.check_dependencies(&mut env)
}

/// Lanza la reducción de la parte 1 con un scheduler nuevo.
fn launch(h: &mut Harness) -> ProcessScheduler {
    let mut sched = ProcessScheduler::new();
    let mut env = h.env();
    let job = ReductionJob::new(PartId(1), ReductionPurpose::Dynamics, &mut env).unwrap();
    assert!(sched.push_solver_process(Job::Reduction(job), env.session));
    sched.run(&mut env);
    sched
}

#[test]
fn cached_exact_results_need_no_work() {
    let mut h = Harness::with_parts(&["P"]);
    let cs = h.wanted(1);
    h.write_cached(1, "P_1", Some(cs));

    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);
    assert!(h.launcher.launched.is_empty());
    assert_eq!(h.part(1).result_files.task_dir.as_deref(), Some("P_1"));
}

#[test]
fn stale_directory_is_skipped_for_matching_sibling() {
    let mut h = Harness::with_parts(&["P"]);
    let cs = h.wanted(1);
    h.write_cached(1, "P_1", Some(cs ^ 0xff));
    h.write_cached(1, "P_2", Some(cs));
    h.record_task_dir(1, "P_1");

    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);
    let files = &h.part(1).result_files;
    assert_eq!(files.task_dir.as_deref(), Some("P_2"));
    assert_eq!(files.file(MatrixKind::Stiffness), Some("P_S.fmx"));
    assert!(h.part(1).needs_save);
    assert!(h.session
             .events()
             .iter()
             .any(|e| e.kind == SessionEventKind::CacheHit { part: 1, task_dir: "P_2".into() }));
}

#[test]
fn first_acceptable_candidate_wins() {
    let mut h = Harness::with_parts(&["P"]);
    let cs = h.wanted(1);
    h.write_cached(1, "P_10", Some(cs));
    h.write_cached(1, "P_3", Some(cs));
    h.write_cached(1, "P_2", Some(cs ^ 1));

    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);
    assert_eq!(h.part(1).result_files.task_dir.as_deref(), Some("P_3"));
}

#[test]
fn uncached_part_reduces_into_first_directory() {
    let mut h = Harness::with_parts(&["P"]);
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ReadyToRun);
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ReadyToRun);

    let mut sched = launch(&mut h);
    assert!(sched.is_group_running(JobGroup::Reducer));
    assert_eq!(h.launcher.launched.len(), 1);
    let req = h.launcher.launched[0].clone();
    assert!(req.working_dir.ends_with("link_DB/P/P_1"));
    assert_eq!(req.program, "fedem_reducer");
    assert_eq!(req.args, ["-fco", "fedem_reducer.fco", "-fop", "fedem_reducer.fop", "-consolemsg"]);
    assert!(req.working_dir.join("fedem_reducer.fco").exists());
    assert_eq!(h.part(1).lock_level, LockLevel::DenyAllLinkMod);

    h.write_reducer_output(1, &req.working_dir);
    let rx = sched.subscribe(&req.signature);
    let done = sched.on_solver_process_death(&req.signature, ProcessExit::Code(0), &mut h.env()).unwrap();
    assert_eq!(done.status, CompletionStatus::Succeeded);
    assert_eq!(rx.try_recv().unwrap(), done);
    assert!(rx.try_recv().is_err());
    assert!(!sched.is_group_running(JobGroup::Reducer));
    assert!(sched.is_idle());
    assert_eq!(h.part(1).lock_level, LockLevel::AllowModifications);
    assert!(ChecksumSidecar::path_for(&req.working_dir, "P").exists());

    let mut env = h.env();
    let mut again = ReductionJob::new(PartId(1), ReductionPurpose::Dynamics, &mut env).unwrap();
    assert_eq!(again.check_dependencies(&mut env), DependencyOutcome::ResultsOk);
    assert!(again.is_reduced(&mut env));
}

#[test]
fn lock_changes_are_recorded() {
    let mut h = Harness::with_parts(&["P"]);
    let mut sched = launch(&mut h);
    let req = h.launcher.launched[0].clone();
    sched.on_solver_process_death(&req.signature, ProcessExit::Code(1), &mut h.env());
    let locks: Vec<bool> = h.session
                            .events()
                            .into_iter()
                            .filter_map(|e| match e.kind {
                                SessionEventKind::PartLockChanged { locked, .. } => Some(locked),
                                _ => None,
                            })
                            .collect();
    assert_eq!(locks, vec![true, false]);
    assert_eq!(h.part(1).lock_level, LockLevel::AllowModifications);
}

#[test]
fn zero_exit_with_wrong_checksum_is_a_failure() {
    let mut h = Harness::with_parts(&["P"]);
    let mut sched = launch(&mut h);
    let req = h.launcher.launched[0].clone();
    h.write_reducer_output(1, &req.working_dir);
    ChecksumSidecar::current(h.wanted(1) ^ 7).write(&ChecksumSidecar::path_for(&req.working_dir, "P")).unwrap();

    let done = sched.on_solver_process_death(&req.signature, ProcessExit::Code(0), &mut h.env()).unwrap();
    assert_eq!(done.status, CompletionStatus::Failed);
    let diag = done.diagnostic.unwrap();
    assert!(diag.contains("Checksum mismatch"));
    assert!(diag.contains("Save the model and reopen it"));
    assert!(h.part(1).needs_save);
    assert!(h.session.has_failed(PartId(1)));
}

#[test]
fn zero_exit_with_missing_files_is_a_failure() {
    let mut h = Harness::with_parts(&["P"]);
    let mut sched = launch(&mut h);
    let req = h.launcher.launched[0].clone();

    let done = sched.on_solver_process_death(&req.signature, ProcessExit::Code(0), &mut h.env()).unwrap();
    assert_eq!(done.status, CompletionStatus::Failed);
    let diag = done.diagnostic.unwrap();
    assert!(diag.contains("Missing"));
    assert!(diag.contains("P_S.fmx"));
    assert!(diag.contains("A re-reduction is needed"));
}

#[test]
fn is_reduced_runs_the_full_cache_lookup() {
    let mut h = Harness::with_parts(&["P", "G"]);
    h.model.parts[1].use_generic_properties = true;
    let cs = h.wanted(1);
    h.write_cached(1, "P_2", Some(cs));

    let mut env = h.env();
    let mut generic = ReductionJob::new(PartId(2), ReductionPurpose::Dynamics, &mut env).unwrap();
    assert!(!generic.is_reduced(&mut env));
    let mut job = ReductionJob::new(PartId(1), ReductionPurpose::Dynamics, &mut env).unwrap();
    assert!(job.is_reduced(&mut env));
    assert_eq!(h.part(1).result_files.task_dir.as_deref(), Some("P_2"));
    assert!(h.launcher.launched.is_empty());
}

#[test]
fn failed_part_is_not_retried_until_cleared() {
    let mut h = Harness::with_parts(&["P"]);
    let mut sched = launch(&mut h);
    let req = h.launcher.launched[0].clone();
    sched.on_solver_process_death(&req.signature, ProcessExit::Code(2), &mut h.env());

    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::NotExecutable);
    h.session.clear_failures();
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ReadyToRun);
}

#[test]
fn killed_reduction_is_reported_as_killed() {
    let mut h = Harness::with_parts(&["P"]);
    let mut sched = launch(&mut h);
    let req = h.launcher.launched[0].clone();

    assert!(sched.kill(&req.signature, &mut h.env()).unwrap());
    assert_eq!(h.launcher.killed, vec![req.signature.clone()]);
    let done = sched.on_solver_process_death(&req.signature, ProcessExit::Code(-9), &mut h.env()).unwrap();
    assert_eq!(done.status, CompletionStatus::Killed);
    assert!(done.diagnostic.is_none());
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::NotExecutable);
}

#[test]
fn refused_launch_unlocks_and_remembers_failure() {
    let mut h = Harness::with_parts(&["P"]);
    h.launcher.refuse = true;
    let sched = launch(&mut h);
    assert!(!sched.is_group_running(JobGroup::Reducer));
    assert!(sched.is_idle());
    assert_eq!(h.part(1).lock_level, LockLevel::AllowModifications);
    assert!(h.session.has_failed(PartId(1)));
}

#[test]
fn skipped_and_locked_parts() {
    let mut h = Harness::with_parts(&["P"]);
    h.model.parts[0].use_generic_properties = true;
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);

    h.model.parts[0].use_generic_properties = false;
    h.model.parts[0].lock_level = LockLevel::DenyLinkUsage;
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::NotExecutable);

    h.model.parts[0].lock_level = LockLevel::AllowModifications;
    h.model.parts[0].fe_file = None;
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::NotExecutable);
}

#[test]
fn external_matrices() {
    let mut h = Harness::with_parts(&["P"]);
    h.model.parts[0].external_matrices = Some(ExternalMatrices { stiffness: PathBuf::from("ext/k.op2"),
                                                                 mass: PathBuf::from("ext/m.op2"),
                                                                 gravity: None });
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::NotExecutable);

    let ext = h.dir.path().join("ext");
    fs::create_dir_all(&ext).unwrap();
    fs::write(ext.join("k.op2"), "k").unwrap();
    fs::write(ext.join("m.op2"), "m").unwrap();
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);
    assert_eq!(check(&mut h, ReductionPurpose::Recovery), DependencyOutcome::NotExecutable);
}

#[test]
fn ignored_checksum_trusts_existing_files_only() {
    let mut h = Harness::with_parts(&["P"]);
    h.model.parts[0].override_checksum = true;
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::NotExecutable);

    h.write_cached(1, "P_4", None);
    h.record_task_dir(1, "P_4");
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);
}

#[test]
fn unloaded_definition_accepted_only_when_lenient() {
    let mut h = Harness::with_parts(&["P"]);
    h.model.parts[0].definition_checksum = None;
    h.write_cached(1, "P_1", None);
    h.record_task_dir(1, "P_1");
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);

    h.validator = ChecksumValidator::new(LeniencyPolicy::strict());
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ReadyToRun);
}

#[test]
fn legacy_sidecar_accepted_only_when_lenient() {
    let mut h = Harness::with_parts(&["P"]);
    let dir = h.write_cached(1, "P_1", None);
    ChecksumSidecar { revision: 1,
                      checksum: 5 }.write(&ChecksumSidecar::path_for(&dir, "P"))
                                   .unwrap();
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);

    h.record_task_dir(1, "P_1");
    h.validator = ChecksumValidator::new(LeniencyPolicy { accept_unverified: true,
                                                          accept_legacy: false });
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ReadyToRun);
}

#[test]
fn batch_preparation_accepts_directory_still_being_filled() {
    let mut h = Harness::with_parts(&["P"]);
    fs::create_dir_all(h.repository(1).join("P_1")).unwrap();
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ReadyToRun);

    h.settings.batch = true;
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);
    assert_eq!(h.part(1).result_files.task_dir.as_deref(), Some("P_1"));
}

#[test]
fn recovery_needs_recovery_matrices() {
    let mut h = Harness::with_parts(&["P"]);
    let cs = h.wanted(1);
    let dir = h.write_cached(1, "P_1", Some(cs));
    fs::remove_file(dir.join("P_B.fmx")).unwrap();
    assert_eq!(check(&mut h, ReductionPurpose::Dynamics), DependencyOutcome::ResultsOk);
    assert_eq!(check(&mut h, ReductionPurpose::Recovery), DependencyOutcome::ReadyToRun);
}

#[test]
fn nonlinear_reduction_reads_state_count() {
    let mut h = Harness::with_parts(&["P"]);
    h.model.parts[0].reduction.nonlinear_reduction = true;
    h.model.parts[0].reduction.nonlinear_solutions = 3;
    let mut sched = launch(&mut h);
    let req = h.launcher.launched[0].clone();
    h.write_reducer_output(1, &req.working_dir);
    fs::write(req.working_dir.join("P_numStates.txt"), "7\n").unwrap();

    let done = sched.on_solver_process_death(&req.signature, ProcessExit::Code(0), &mut h.env()).unwrap();
    assert_eq!(done.status, CompletionStatus::Succeeded);
    assert_eq!(h.part(1).nonlinear_states, 7);
    assert_eq!(h.part(1).result_files.file(MatrixKind::NonlinearForce), Some("P_F.fmx"));
}

#[test]
fn terminal_output_rules() {
    let mut h = Harness::with_parts(&["P"]);
    h.settings.max_concurrent = 2;
    launch(&mut h);
    assert!(h.launcher.launched[0].args.ends_with(&["-terminal".to_string(), "-1".to_string()]));

    let mut h = Harness::with_parts(&["P"]);
    h.settings.console = false;
    h.model.analysis.reducer_add_opts = "-debug 1".into();
    launch(&mut h);
    let args = &h.launcher.launched[0].args;
    assert!(args.contains(&"-fao".to_string()));
    assert!(args.ends_with(&["-terminal".to_string(), "7".to_string()]));
}
