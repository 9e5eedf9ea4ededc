//! sim-core: orquestación de procesos de reducción/solver con caché por
//! checksum.
pub mod checksum;
pub mod consistency;
pub mod constants;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod input;
pub mod job;
pub mod process;
pub mod scheduler;
pub mod session;

pub use checksum::{ChecksumSidecar, ChecksumValidator, DirVerdict, FileValidity, LeniencyPolicy, ValidateFileSet};
pub use consistency::ConsistencyCheck;
pub use errors::{InputError, LaunchError, OrchestrationError, SidecarError};
pub use event::{EventStore, InMemoryEventStore, SessionEvent, SessionEventKind};
pub use hashing::{reduction_checksum, Checksum, ChecksumAccumulator};
pub use input::{InputGenerator, ReducerInput, SolverInput};
pub use job::{CompletionStatus, DependencyOutcome, Environment, ExecuteOutcome, Job, JobCompletion, JobGroup,
              JobSettings, JobSignature, ReductionJob, SolverJob};
pub use process::{ProcessExit, ProcessLauncher, ProcessOptions, ProcessRequest};
pub use scheduler::ProcessScheduler;
pub use session::SessionRegistry;
