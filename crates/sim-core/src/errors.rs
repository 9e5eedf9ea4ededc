//! Errores del core. Los resultados de orquestación (`DependencyOutcome`) son
//! valores, no errores; aquí solo hay fallos de E/S y de configuración.
use std::path::PathBuf;

use sim_domain::{EventId, PartId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("unknown part {0}")] UnknownPart(PartId),
    #[error("unknown event {0}")] UnknownEvent(EventId),
    #[error("launcher: {0}")] Launch(#[from] LaunchError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("no running process for {0}")] NotRunning(String),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot write {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid input: {0}")] Invalid(String),
}

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("sidecar {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sidecar encoding: {0}")] Encode(String),
}
