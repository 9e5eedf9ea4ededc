use sim_adapters::AdapterError;
use sim_core::OrchestrationError;
use sim_domain::DomainError;
use thiserror::Error;

/// Errores de la aplicación
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de configuración: {0}")]
    Config(String),
    #[error("Error de dominio: {0}")]
    Domain(#[from] DomainError),
    #[error("Error de orquestación: {0}")]
    Orchestration(#[from] OrchestrationError),
    #[error("Error de adaptador: {0}")]
    Adapter(#[from] AdapterError),
    #[error("Modelo inconsistente: {}", .0.join("; "))]
    Inconsistent(Vec<String>),
    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
}
