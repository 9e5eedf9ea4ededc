//! Registro/cola de procesos.
//!
//! Invariantes:
//! - Nunca hay dos trabajos vivos (en cola o en ejecución) con la misma firma
//!   o la misma identidad lógica.
//! - El scheduler es dueño de los trabajos mientras están en cola o en
//!   ejecución; el fin de un proceso se enruta por firma al trabajo original.
//! - `run` es síncrono: saca trabajos de la cola hasta llenar el límite de
//!   procesos concurrentes; lo que debe esperar queda en `pending` y se
//!   re-evalúa en la siguiente notificación de fin.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{channel, Receiver, Sender};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::errors::{LaunchError, OrchestrationError};
use crate::event::SessionEventKind;
use crate::job::{CompletionStatus, DependencyOutcome, Environment, ExecuteOutcome, Job, JobCompletion, JobGroup,
                 JobSignature};
use crate::process::ProcessExit;
use crate::session::SessionRegistry;

#[derive(Default)]
pub struct ProcessScheduler {
    /// Pila: el último encolado se procesa primero.
    queued: Vec<Job>,
    /// Trabajos que esperan a que termine algo en ejecución.
    pending: VecDeque<Job>,
    running: IndexMap<JobSignature, Job>,
    listeners: HashMap<JobSignature, Vec<Sender<JobCompletion>>>,
    kill_requested: HashSet<JobSignature>,
    batch_prepared: Vec<JobGroup>,
}

impl ProcessScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(&self, job: &Job) -> bool {
        let sig = job.signature();
        let id = job.identity();
        self.running.contains_key(sig)
        || self.running.values().any(|j| j.identity() == id)
        || self.queued.iter().chain(self.pending.iter()).any(|j| j.signature() == sig || j.identity() == id)
    }

    /// Encola `job`. No hace nada si ya hay uno igual en cola o en ejecución.
    pub fn push_solver_process(&mut self, job: Job, session: &mut SessionRegistry) -> bool {
        if self.is_live(&job) {
            debug!("{} already queued or running", job.signature());
            return false;
        }
        session.record(SessionEventKind::JobQueued { signature: job.signature().to_string(),
                                                     group: job.group() });
        self.queued.push(job);
        true
    }

    pub fn is_group_running(&self, group: JobGroup) -> bool {
        self.running.values().any(|j| j.group() == group)
    }

    pub fn is_running(&self, signature: &JobSignature) -> bool {
        self.running.contains_key(signature)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// En cola o diferidos, sin contar los que están en ejecución.
    pub fn waiting_count(&self) -> usize {
        self.queued.len() + self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.queued.is_empty() && self.pending.is_empty()
    }

    /// Hay trabajo en cola pero nada en ejecución que pueda destrabarlo.
    pub fn is_stalled(&self) -> bool {
        self.running.is_empty() && !self.is_idle()
    }

    /// Grupos cuya entrada se generó para ejecución batch.
    pub fn batch_prepared(&self) -> &[JobGroup] {
        &self.batch_prepared
    }

    /// Receptor notificado una única vez cuando termine `signature`.
    pub fn subscribe(&mut self, signature: &JobSignature) -> Receiver<JobCompletion> {
        let (tx, rx) = channel();
        self.listeners.entry(signature.clone()).or_default().push(tx);
        rx
    }

    pub fn after_batch_preparation(&mut self, group: JobGroup, session: &mut SessionRegistry) {
        info!("===> Batch input prepared for {group:?}");
        session.record(SessionEventKind::BatchPrepared { group });
        if !self.batch_prepared.contains(&group) {
            self.batch_prepared.push(group);
        }
    }

    /// Procesa la cola hasta llenar el límite de procesos concurrentes.
    pub fn run(&mut self, env: &mut Environment<'_>) {
        loop {
            let progressed = self.run_pass(env);
            // nada en ejecución que vaya a notificar: re-evaluar lo diferido
            if !self.running.is_empty() || self.pending.is_empty() || !progressed {
                break;
            }
        }
        if self.is_stalled() {
            warn!("{} job(s) left waiting with nothing running", self.queued.len() + self.pending.len());
        }
    }

    fn run_pass(&mut self, env: &mut Environment<'_>) -> bool {
        let max = env.settings.max_concurrent.max(1);
        let mut deferred = Vec::new();
        let mut progressed = false;
        while self.running.len() < max {
            let (mut job, from_pending) = if let Some(job) = self.pending.pop_front() {
                (job, true)
            } else if let Some(job) = self.queued.pop() {
                (job, false)
            } else {
                break;
            };
            if self.running.contains_key(job.signature()) {
                debug!("{} is already running, dropped", job.signature());
                progressed = true;
                continue;
            }

            let depth = self.queued.len();
            match job.execute(env, self) {
                ExecuteOutcome::Started => {
                    progressed = true;
                    env.session.record(SessionEventKind::JobStarted { signature: job.signature().to_string(),
                                                                      group: job.group() });
                    self.running.insert(job.signature().clone(), job);
                }
                ExecuteOutcome::Prepared => {
                    progressed = true;
                    self.after_batch_preparation(job.group(), env.session);
                    self.finish(&job, CompletionStatus::Prepared, None, env.session);
                }
                ExecuteOutcome::NotStarted(DependencyOutcome::ResultsOk) => {
                    progressed = true;
                    self.finish(&job, CompletionStatus::UpToDate, None, env.session);
                }
                ExecuteOutcome::NotStarted(DependencyOutcome::NotExecutable) => {
                    progressed = true;
                    warn!("{} is not executable", job.signature());
                    self.finish(&job, CompletionStatus::NotExecutable, None, env.session);
                }
                ExecuteOutcome::NotStarted(DependencyOutcome::PendingDependencies) if !from_pending => {
                    // debajo de las dependencias recién encoladas
                    if self.queued.len() > depth {
                        progressed = true;
                        self.queued.insert(depth, job);
                    } else {
                        deferred.push(job);
                    }
                }
                ExecuteOutcome::NotStarted(_) => deferred.push(job),
            }
        }
        self.pending.extend(deferred);
        progressed
    }

    /// Fin de un proceso: lo enruta al trabajo que lo lanzó y sigue con la cola.
    pub fn on_solver_process_death(&mut self,
                                   signature: &JobSignature,
                                   exit: ProcessExit,
                                   env: &mut Environment<'_>)
                                   -> Option<JobCompletion> {
        let Some(mut job) = self.running.shift_remove(signature) else {
            warn!("process death for unknown job {signature}");
            return None;
        };
        let exit = if self.kill_requested.remove(signature) { ProcessExit::Killed } else { exit };
        let completion = job.on_actual_process_death(exit, env);

        if let Job::Solver(solver) = &job {
            let event = solver.event();
            let dir = env.model.results_dir(event);
            if let Err(e) = env.model.results_mut(event).sync_from_disk(&dir) {
                warn!("cannot sync results in {}: {e}", dir.display());
            }
        }
        self.finish(&job, completion.status, completion.diagnostic.clone(), env.session);
        self.run(env);
        Some(completion)
    }

    /// Mata un trabajo. Si aún no arrancó, se retira de la cola. Devuelve
    /// false si no había nada que matar.
    pub fn kill(&mut self, signature: &JobSignature, env: &mut Environment<'_>) -> Result<bool, OrchestrationError> {
        if self.running.contains_key(signature) {
            return self.kill_running(signature, env).map_err(Into::into);
        }
        let (mut removed, queued): (Vec<Job>, Vec<Job>) =
            std::mem::take(&mut self.queued).into_iter().partition(|j| j.signature() == signature);
        let (waiting, pending): (VecDeque<Job>, VecDeque<Job>) =
            std::mem::take(&mut self.pending).into_iter().partition(|j| j.signature() == signature);
        self.queued = queued;
        self.pending = pending;
        removed.extend(waiting);
        for job in &removed {
            self.finish(job, CompletionStatus::Killed, None, env.session);
        }
        Ok(!removed.is_empty())
    }

    /// Vacía la cola; con `running_too` también mata lo que está en ejecución.
    pub fn kill_all(&mut self, running_too: bool, env: &mut Environment<'_>) -> Result<(), OrchestrationError> {
        let waiting: Vec<Job> = self.queued.drain(..).chain(self.pending.drain(..)).collect();
        for job in &waiting {
            self.finish(job, CompletionStatus::Killed, None, env.session);
        }
        if running_too {
            // un fallo no deja sin matar al resto; se devuelve el primero
            let signatures: Vec<JobSignature> = self.running.keys().cloned().collect();
            let mut first_err = None;
            for sig in signatures {
                if let Err(e) = self.kill_running(&sig, env) {
                    first_err.get_or_insert(e);
                }
            }
            if let Some(e) = first_err {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Pide al lanzador que mate un proceso en ejecución. Un proceso que ya
    /// terminó por su cuenta (su informe aún no llegó) no es un error: su fin
    /// se procesará con el código real.
    fn kill_running(&mut self, signature: &JobSignature, env: &mut Environment<'_>) -> Result<bool, LaunchError> {
        self.kill_requested.insert(signature.clone());
        match env.launcher.kill(signature) {
            Ok(()) => Ok(true),
            Err(LaunchError::NotRunning(_)) => {
                self.kill_requested.remove(signature);
                debug!("{signature} already exited, nothing to kill");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn finish(&mut self, job: &Job, status: CompletionStatus, diagnostic: Option<String>, session: &mut SessionRegistry) {
        session.record(SessionEventKind::JobFinished { signature: job.signature().to_string(),
                                                       group: job.group(),
                                                       status,
                                                       diagnostic: diagnostic.clone() });
        let Some(listeners) = self.listeners.remove(job.signature()) else {
            return;
        };
        let completion = JobCompletion { signature: job.signature().clone(),
                                         group: job.group(),
                                         status,
                                         diagnostic };
        for tx in listeners {
            // un receptor soltado no es un error
            let _ = tx.send(completion.clone());
        }
    }
}
