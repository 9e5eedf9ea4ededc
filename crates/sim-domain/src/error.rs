use std::path::PathBuf;

use thiserror::Error;

/// Errores del modelo (carga, validación y bloqueos de edición).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Error de validación: {0}")]
    ValidationError(String),

    #[error("Parte {0} bloqueada: reducción en curso")]
    Locked(String),

    #[error("No se pudo leer {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error de serialización: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::SerializationError(e.to_string())
    }
}
