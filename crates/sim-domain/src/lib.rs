// sim-domain library entry point
//
// Tipos de valor del modelo que consume el núcleo de orquestación: partes
// estructurales, eventos de simulación, opciones de análisis y los conjuntos
// de archivos de resultados que quedan en disco.
pub mod analysis;
pub mod error;
pub mod event;
pub mod model;
pub mod part;
pub mod results;

pub use analysis::{AnalysisOptions, EquationSolver, PluginEntry};
pub use error::DomainError;
pub use event::{EventId, SimulationEvent};
pub use model::Model;
pub use part::{ExternalMatrices, LockLevel, Part, PartId, ReductionOptions};
pub use results::{MatrixKind, ReductionPurpose, Requirement, ResultFileSet, ResultStatus};
