//! Trabajos de orquestación: unión cerrada `ReductionJob | SolverJob`.
//!
//! Rol en el flujo:
//! - El llamador crea un trabajo por pedido y lo entrega al
//!   `ProcessScheduler`, que pasa a ser su dueño mientras está en cola o en
//!   ejecución.
//! - Los trabajos no guardan referencias al modelo: lo identifican por
//!   `PartId`/`EventId` y reciben un `Environment` en cada llamada.
//! - `check_dependencies` nunca bloquea; "esperar" es devolver
//!   `PendingDependencies*` y ser re-evaluado tras una notificación.
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sim_domain::{EventId, Model, PartId};

use crate::checksum::ChecksumValidator;
use crate::constants::{DEFAULT_REDUCER_TOOL, DEFAULT_SOLVER_TOOL};
use crate::input::InputGenerator;
use crate::process::{ProcessExit, ProcessLauncher};
use crate::scheduler::ProcessScheduler;
use crate::session::SessionRegistry;

mod reduction;
mod scope;
mod solver;

pub use reduction::ReductionJob;
pub use scope::ActiveEventScope;
pub use solver::SolverJob;

/// Clave de deduplicación, p.ej. `fedem_reducer@/model/link_DB/arm/arm_1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobSignature(String);

impl JobSignature {
    pub fn new(tool: &str, location: impl fmt::Display) -> Self {
        Self(format!("{tool}@{location}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Categoría para la exclusión mutua reducción/solución.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobGroup {
    Reducer,
    DynamicsSolver,
}

/// Estado de dependencias de un trabajo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyOutcome {
    /// Acierto de caché: nada que ejecutar.
    ResultsOk,
    /// Fallo terminal; no se reintenta automáticamente.
    NotExecutable,
    ReadyToRun,
    /// Se encolaron sub-trabajos; re-evaluar más tarde.
    PendingDependencies,
    /// Bloqueado por otra categoría en ejecución; nada encolado.
    PendingDependenciesButWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Started,
    /// Entrada generada para ejecución batch; no se lanzó nada.
    Prepared,
    NotStarted(DependencyOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Succeeded,
    UpToDate,
    Prepared,
    Failed,
    NotExecutable,
    Killed,
}

/// Notificación de fin de un trabajo, entregada a los suscriptores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub signature: JobSignature,
    pub group: JobGroup,
    pub status: CompletionStatus,
    pub diagnostic: Option<String>,
}

/// Parámetros de la sesión que afectan a la construcción de procesos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub reducer_tool: String,
    pub solver_tool: String,
    /// Aplicación de consola (sin GUI).
    pub console: bool,
    /// Solo preparar entradas para ejecución offline.
    pub batch: bool,
    pub max_concurrent: usize,
}

impl JobSettings {
    /// Nombre corto del reductor: archivos de opciones, `.res` y firma.
    pub fn reducer_name(&self) -> &str {
        tool_name(&self.reducer_tool)
    }

    pub fn solver_name(&self) -> &str {
        tool_name(&self.solver_tool)
    }
}

/// `/opt/fedem/bin/fedem_reducer.exe` -> `fedem_reducer`.
pub fn tool_name(tool: &str) -> &str {
    Path::new(tool).file_stem().and_then(|s| s.to_str()).unwrap_or(tool)
}

impl Default for JobSettings {
    fn default() -> Self {
        Self { reducer_tool: DEFAULT_REDUCER_TOOL.to_string(),
               solver_tool: DEFAULT_SOLVER_TOOL.to_string(),
               console: true,
               batch: false,
               max_concurrent: 1 }
    }
}

/// Todo lo que un trabajo necesita fuera de sí mismo.
pub struct Environment<'a> {
    pub model: &'a mut Model,
    pub session: &'a mut SessionRegistry,
    pub launcher: &'a mut dyn ProcessLauncher,
    pub inputs: &'a dyn InputGenerator,
    pub validator: ChecksumValidator,
    pub settings: &'a JobSettings,
}

/// Identidad lógica, independiente de la firma (que puede llevar un nombre
/// de tarea sintetizado distinto en cada intento).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobIdentity {
    pub group: JobGroup,
    pub part: Option<PartId>,
    pub event: Option<EventId>,
}

#[derive(Debug)]
pub enum Job {
    Reduction(ReductionJob),
    Solver(SolverJob),
}

impl Job {
    pub fn signature(&self) -> &JobSignature {
        match self {
            Job::Reduction(j) => j.signature(),
            Job::Solver(j) => j.signature(),
        }
    }

    pub fn group(&self) -> JobGroup {
        match self {
            Job::Reduction(_) => JobGroup::Reducer,
            Job::Solver(_) => JobGroup::DynamicsSolver,
        }
    }

    pub fn identity(&self) -> JobIdentity {
        match self {
            Job::Reduction(j) => JobIdentity { group: JobGroup::Reducer,
                                               part: Some(j.part()),
                                               event: None },
            Job::Solver(j) => JobIdentity { group: JobGroup::DynamicsSolver,
                                            part: None,
                                            event: j.event() },
        }
    }

    pub fn check_dependencies(&mut self, env: &mut Environment<'_>, scheduler: &mut ProcessScheduler) -> DependencyOutcome {
        match self {
            Job::Reduction(j) => j.check_dependencies(env),
            Job::Solver(j) => j.check_dependencies(env, scheduler),
        }
    }

    pub fn execute(&mut self, env: &mut Environment<'_>, scheduler: &mut ProcessScheduler) -> ExecuteOutcome {
        match self {
            Job::Reduction(j) => j.execute(env),
            Job::Solver(j) => j.execute(env, scheduler),
        }
    }

    pub fn on_actual_process_death(&mut self, exit: ProcessExit, env: &mut Environment<'_>) -> JobCompletion {
        match self {
            Job::Reduction(j) => j.on_actual_process_death(exit, env),
            Job::Solver(j) => j.on_actual_process_death(exit, env),
        }
    }
}
