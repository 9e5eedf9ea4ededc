//! Driver asíncrono de una sesión de cálculo.
//!
//! Une el scheduler síncrono con el lanzador tokio: arranca la cola, espera
//! los `ProcessReport` del canal y los entrega al scheduler hasta que no
//! quede nada en ejecución. Ctrl-C mata todo lo vivo.
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use log::{error, info, warn};
use sim_adapters::{FileInputGenerator, JsonlEventStore, ProcessReport, TokioLauncher};
use sim_core::{ChecksumValidator, CompletionStatus, ConsistencyCheck, Environment, InMemoryEventStore, Job,
               JobCompletion, JobGroup, JobSettings, ProcessScheduler, ReductionJob,
               SessionRegistry, SolverJob};
use sim_domain::{EventId, Model, ReductionPurpose};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::AppConfig;
use crate::errors::AppError;

/// Qué pedir en una llamada a `solve`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveRequest {
    /// None = modelo maestro.
    pub event: Option<EventId>,
    /// Solo generar entradas, sin lanzar binarios.
    pub batch: bool,
    /// Reducir todas las partes para recuperación de resultados.
    pub recovery: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SolveSummary {
    /// Fin de los trabajos pedidos (no de las dependencias).
    pub completions: Vec<JobCompletion>,
    pub batch_prepared: Vec<JobGroup>,
    /// La cola quedó con trabajo que nunca pudo arrancar.
    pub stalled: bool,
    pub interrupted: bool,
}

impl SolveSummary {
    pub fn succeeded(&self) -> bool {
        !self.stalled
        && !self.interrupted
        && self.completions.iter().all(|c| {
                                      matches!(c.status,
                                               CompletionStatus::Succeeded
                                               | CompletionStatus::UpToDate
                                               | CompletionStatus::Prepared)
                                  })
    }
}

pub struct SolveSession {
    model: Model,
    model_path: Option<PathBuf>,
    registry: SessionRegistry,
    config: AppConfig,
    inputs: FileInputGenerator,
}

impl SolveSession {
    pub fn new(model: Model, config: AppConfig) -> Result<Self, AppError> {
        let registry = match &config.event_log {
            Some(path) => SessionRegistry::new(Box::new(JsonlEventStore::open(path)?)),
            None => SessionRegistry::new(Box::new(InMemoryEventStore::default())),
        };
        info!("session {} for model '{}'", registry.id(), model.name);
        Ok(Self { model,
                  model_path: None,
                  registry,
                  config,
                  inputs: FileInputGenerator::new() })
    }

    /// Carga el modelo desde disco; se vuelve a guardar si una parte lo pide.
    pub fn open(path: &Path, config: AppConfig) -> Result<Self, AppError> {
        let mut model = Model::load(path)?;
        let root = model.root.clone();
        for part in model.parts.iter_mut().filter(|p| p.fe_file.is_some()) {
            if let Err(e) = part.load_fe_data(&root) {
                warn!("{}: {e}", part.id_string());
            }
        }
        let mut session = Self::new(model, config)?;
        session.model_path = Some(path.to_path_buf());
        Ok(session)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SessionRegistry {
        &mut self.registry
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    /// Verificación previa sin lanzar nada.
    pub fn check(&self) -> Result<(), AppError> {
        self.model.check_consistency().map_err(AppError::Inconsistent)
    }

    pub async fn solve(&mut self, request: &SolveRequest) -> Result<SolveSummary, AppError> {
        let (launcher, reports) = TokioLauncher::current()?;
        let settings = self.config.job_settings(&self.model, request.batch);
        let summary = self.drive(request, &settings, launcher, reports).await?;
        self.save_if_needed()?;
        Ok(summary)
    }

    async fn drive(&mut self,
                   request: &SolveRequest,
                   settings: &JobSettings,
                   mut launcher: TokioLauncher,
                   mut reports: UnboundedReceiver<ProcessReport>)
                   -> Result<SolveSummary, AppError> {
        let mut scheduler = ProcessScheduler::new();
        let mut env = Environment { model: &mut self.model,
                                    session: &mut self.registry,
                                    launcher: &mut launcher,
                                    inputs: &self.inputs,
                                    validator: ChecksumValidator::new(self.config.leniency()),
                                    settings };

        let listeners = push_roots(request, &mut scheduler, &mut env)?;
        scheduler.run(&mut env);

        let mut interrupted = false;
        while !scheduler.is_idle() {
            if scheduler.is_stalled() {
                error!("{} job(s) can never start", scheduler.waiting_count());
                break;
            }
            tokio::select! {
                report = reports.recv() => match report {
                    Some(report) => {
                        scheduler.on_solver_process_death(&report.signature, report.exit, &mut env);
                    }
                    None => break,
                },
                res = tokio::signal::ctrl_c(), if !interrupted => {
                    if let Err(e) = res {
                        warn!("cannot listen for ctrl-c: {e}");
                    }
                    interrupted = true;
                    warn!("interrupted, killing {} process(es)", scheduler.running_count());
                    if let Err(e) = scheduler.kill_all(true, &mut env) {
                        warn!("some processes could not be killed: {e}");
                    }
                }
            }
        }

        let stalled = scheduler.is_stalled();
        let completions = listeners.iter().filter_map(|rx| rx.try_recv().ok()).collect();
        Ok(SolveSummary { completions,
                          batch_prepared: scheduler.batch_prepared().to_vec(),
                          stalled,
                          interrupted })
    }

    fn save_if_needed(&mut self) -> Result<(), AppError> {
        if !self.model.parts.iter().any(|p| p.needs_save) {
            return Ok(());
        }
        let Some(path) = &self.model_path else {
            warn!("model '{}' changed but has no file to save to", self.model.name);
            return Ok(());
        };
        self.model.save(path)?;
        info!("model saved to {}", path.display());
        for part in &mut self.model.parts {
            part.needs_save = false;
        }
        Ok(())
    }
}

/// Encola los trabajos pedidos y devuelve un receptor por cada uno.
fn push_roots(request: &SolveRequest,
              scheduler: &mut ProcessScheduler,
              env: &mut Environment<'_>)
              -> Result<Vec<Receiver<JobCompletion>>, AppError> {
    let mut jobs = Vec::new();
    if request.recovery {
        // la pila saca el último primero: se encola al revés
        for id in env.model.parts_reverse() {
            let skip = env.model.part(id).map_or(true, |p| p.skips_reduction());
            if !skip {
                jobs.push(Job::Reduction(ReductionJob::new(id, ReductionPurpose::Recovery, env)?));
            }
        }
    } else {
        jobs.push(Job::Solver(SolverJob::new(request.event, env)?));
    }

    let mut listeners = Vec::new();
    for job in jobs {
        let rx = scheduler.subscribe(job.signature());
        if scheduler.push_solver_process(job, env.session) {
            listeners.push(rx);
        }
    }
    Ok(listeners)
}
