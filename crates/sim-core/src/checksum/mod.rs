//! Validación de artefactos en disco contra un checksum esperado.

mod sidecar;
mod validator;

pub use sidecar::ChecksumSidecar;
pub use validator::{ChecksumValidator, DirVerdict, FileValidity, LeniencyPolicy, ValidateFileSet};
