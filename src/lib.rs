//! SimFlow Rust Library
//!
//! Fachada de aplicación sobre los crates `sim-*`:
//! - `config`: variables de entorno (.env) y política de aceptación.
//! - `errors`: error de aplicación que agrupa los de cada crate.
//! - `session`: driver asíncrono que conecta scheduler y lanzador.
//!
//! Puede usarse desde el binario `simflow` o por otros clientes.

pub mod config;
pub mod errors;
pub mod session;

pub use config::AppConfig;
pub use errors::AppError;
pub use session::{SolveRequest, SolveSession, SolveSummary};
