//! Solución dinámica de un evento (o del modelo maestro).
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, error, info, warn};
use sim_domain::{EventId, ReductionPurpose};

use super::{CompletionStatus, DependencyOutcome, Environment, ExecuteOutcome, Job, JobCompletion, JobGroup,
            JobSignature, ReductionJob};
use crate::consistency::ConsistencyCheck;
use crate::constants::TERMINAL_DISCARD;
use crate::errors::OrchestrationError;
use crate::event::SessionEventKind;
use crate::input::SolverInput;
use crate::job::scope::ActiveEventScope;
use crate::process::{ProcessExit, ProcessOptions, ProcessRequest};
use crate::scheduler::ProcessScheduler;

#[derive(Debug)]
pub struct SolverJob {
    event: Option<EventId>,
    signature: JobSignature,
    work_dir: Option<PathBuf>,
}

impl SolverJob {
    pub fn new(event: Option<EventId>, env: &mut Environment<'_>) -> Result<Self, OrchestrationError> {
        if let Some(id) = event {
            env.model.event(id).ok_or(OrchestrationError::UnknownEvent(id))?;
        }
        let location = env.model.results_dir(event);
        Ok(Self { event,
                  signature: JobSignature::new(env.settings.solver_name(), location.display()),
                  work_dir: None })
    }

    pub fn signature(&self) -> &JobSignature {
        &self.signature
    }

    pub fn event(&self) -> Option<EventId> {
        self.event
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// Nunca bloquea. Encola la reducción de cada parte que la necesite.
    pub fn check_dependencies(&mut self, env: &mut Environment<'_>, scheduler: &mut ProcessScheduler) -> DependencyOutcome {
        if scheduler.is_group_running(JobGroup::Reducer) {
            env.session.record(SessionEventKind::JobWaiting { signature: self.signature.to_string() });
            return DependencyOutcome::PendingDependenciesButWait;
        }
        if let Err(problems) = env.model.check_consistency() {
            for p in &problems {
                error!("  -> {p}");
            }
            error!("===> {} not started: model consistency check failed, see the messages above",
                   env.settings.solver_name());
            return DependencyOutcome::NotExecutable;
        }

        let mut outcome = DependencyOutcome::ReadyToRun;
        for part in env.model.parts_reverse() {
            let mut job = match ReductionJob::new(part, ReductionPurpose::Dynamics, env) {
                Ok(job) => job,
                Err(e) => {
                    error!("{e}");
                    continue;
                }
            };
            match job.check_dependencies(env) {
                DependencyOutcome::ResultsOk => {}
                DependencyOutcome::NotExecutable => {
                    // solo cuenta si ninguna otra parte tiene trabajo pendiente
                    if outcome == DependencyOutcome::ReadyToRun {
                        outcome = DependencyOutcome::NotExecutable;
                    }
                }
                _ => {
                    scheduler.push_solver_process(Job::Reduction(job), env.session);
                    outcome = DependencyOutcome::PendingDependencies;
                }
            }
        }
        outcome
    }

    pub fn create_input(&mut self, env: &mut Environment<'_>, scheduler: &mut ProcessScheduler) -> DependencyOutcome {
        let outcome = self.check_dependencies(env, scheduler);
        if outcome != DependencyOutcome::ReadyToRun {
            return outcome;
        }
        let results_dir = env.model.results_dir(self.event);
        // el estado guardado puede ir por detrás de lo que hay en disco
        if let Err(e) = env.model.results_mut(self.event).sync_from_disk(&results_dir) {
            error!("cannot scan previous results in {}: {e}", results_dir.display());
            return DependencyOutcome::NotExecutable;
        }
        env.model.snapshot_results(self.event);
        if env.model.analysis.overwrite_results {
            match env.model.results_mut(self.event).remove_all_files(&results_dir) {
                Ok(n) => debug!("{n} previous result files removed from {}", results_dir.display()),
                Err(e) => {
                    error!("cannot remove previous results in {}: {e}", results_dir.display());
                    return DependencyOutcome::NotExecutable;
                }
            }
        }

        let plugins: Vec<PathBuf> = env.model
                                       .analysis
                                       .active_plugins(&env.model.root)
                                       .into_iter()
                                       .filter(|p| {
                                           let found = p.is_file();
                                           if !found {
                                               warn!("plugin {} not found, ignored", p.display());
                                           }
                                           found
                                       })
                                       .collect();

        let task = env.model.results_mut(self.event).bump_version();
        let work_dir = results_dir.join(task);
        if let Err(e) = fs::create_dir_all(&work_dir) {
            error!("cannot create {}: {e}", work_dir.display());
            return DependencyOutcome::NotExecutable;
        }

        let input = SolverInput { tool: env.settings.solver_name(),
                                  work_dir: &work_dir,
                                  model: &*env.model,
                                  event: self.event,
                                  plugins: &plugins,
                                  add_opts: &env.model.analysis.solver_add_opts };
        if let Err(e) = env.inputs.write_solver_input(&input) {
            error!("solver input not written: {e}");
            return DependencyOutcome::NotExecutable;
        }
        if env.model.analysis.auto_vtf_export {
            let target = match &env.model.analysis.vtf_file {
                Some(f) => env.model.root.join(f),
                None => results_dir.join(format!("{}.vtf", env.model.name)),
            };
            if let Err(e) = env.inputs.export_baseline_vtf(&*env.model, &target) {
                error!("baseline VTF export failed: {e}");
                return DependencyOutcome::NotExecutable;
            }
        }
        self.work_dir = Some(work_dir);
        DependencyOutcome::ReadyToRun
    }

    pub fn execute(&mut self, env: &mut Environment<'_>, scheduler: &mut ProcessScheduler) -> ExecuteOutcome {
        // la entrada lee datos del evento: se activa solo mientras se genera
        let outcome = {
            let mut scope = ActiveEventScope::enter(env, self.event);
            self.create_input(&mut scope, scheduler)
        };
        if outcome != DependencyOutcome::ReadyToRun {
            if outcome == DependencyOutcome::NotExecutable {
                info!("===> Dynamics Solver did NOT start");
            }
            return ExecuteOutcome::NotStarted(outcome);
        }
        let Some(work_dir) = self.work_dir.clone() else {
            return ExecuteOutcome::NotStarted(DependencyOutcome::NotExecutable);
        };
        let settings = env.settings;
        let tool = settings.solver_name();
        if settings.batch {
            info!("===> Input files for batch execution of {tool} created in:\n     {}", work_dir.display());
            return ExecuteOutcome::Prepared;
        }

        let add_opts = &env.model.analysis.solver_add_opts;
        let mut opts = ProcessOptions::new();
        opts.add("fco", format!("{tool}.fco")).add("fop", format!("{tool}.fop"));
        if !add_opts.is_empty() {
            opts.add("fao", format!("{tool}.fao"));
        }
        // sin buffering explícito salvo para el evento activo
        if self.event != env.model.active_event() {
            opts.add("flushinc", "-1.0");
        }
        opts.flag("consolemsg");
        let many = settings.max_concurrent > 1 && self.event.is_some();
        if (!settings.console || many) && !add_opts.contains("-terminal") {
            opts.add("terminal", TERMINAL_DISCARD);
        }

        info!("===> Dynamics Solver started: {}\n  -> Results in {}",
              Utc::now().to_rfc2822(),
              work_dir.display());
        let request = ProcessRequest { signature: self.signature.clone(),
                                       program: settings.solver_tool.clone(),
                                       args: opts.into_args(),
                                       working_dir: work_dir };
        if let Err(e) = env.launcher.launch(request) {
            error!("===> {tool} could not be started: {e}");
            return ExecuteOutcome::NotStarted(DependencyOutcome::NotExecutable);
        }
        ExecuteOutcome::Started
    }

    pub fn on_actual_process_death(&mut self, exit: ProcessExit, env: &mut Environment<'_>) -> JobCompletion {
        let tool = env.settings.solver_name();
        let (status, diagnostic) = match exit {
            ProcessExit::Code(0) => {
                info!("===> {tool} done");
                (CompletionStatus::Succeeded, None)
            }
            ProcessExit::Killed => {
                warn!("===> {tool} terminated by user");
                (CompletionStatus::Killed, None)
            }
            ProcessExit::Code(code) => {
                error!("===> {tool} failed (exit code {code})");
                let res = self.work_dir
                              .as_ref()
                              .map(|d| d.join(format!("{tool}.res")).display().to_string())
                              .unwrap_or_else(|| format!("{tool}.res"));
                error!("     See {res} for details");
                (CompletionStatus::Failed, Some(format!("exit code {code}, see {res}")))
            }
        };

        if status != CompletionStatus::Succeeded {
            let results_dir = env.model.results_dir(self.event);
            let previous = env.model.results_snapshot(self.event).cloned();
            let results = env.model.results_mut(self.event);
            if let Err(e) = results.sync_from_disk(&results_dir) {
                warn!("cannot rescan {}: {e}", results_dir.display());
            }
            match results.purge_truncated(&results_dir, previous.as_ref()) {
                Ok(purged) => {
                    for f in purged {
                        info!("  -> removed truncated result file {}", f.display());
                    }
                }
                Err(e) => warn!("cannot purge truncated results: {e}"),
            }
        }
        JobCompletion { signature: self.signature.clone(),
                        group: JobGroup::DynamicsSolver,
                        status,
                        diagnostic }
    }
}
