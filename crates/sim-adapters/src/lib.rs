//! sim-adapters: colaboradores concretos del core.
//!
//! Este crate provee:
//! - `FileInputGenerator`: archivos de opciones (`.fco/.fop/.fao`) y entrada
//!   del solver en el directorio de trabajo.
//! - `TokioLauncher`: procesos externos con `tokio::process`, con el fin de
//!   cada proceso entregado por canal.
//! - `JsonlEventStore`: bitácora de sesión en JSON lines.
//!
//! Nota: el core es síncrono; la asincronía vive solo aquí y en el driver.

pub mod error;
pub mod events;
pub mod input;
pub mod launcher;

pub use error::AdapterError;
pub use events::JsonlEventStore;
pub use input::FileInputGenerator;
pub use launcher::{ProcessReport, TokioLauncher};
