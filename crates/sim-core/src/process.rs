//! Contrato de lanzamiento de procesos externos.
//!
//! El core nunca inspecciona el binario: solo le pasa un directorio de
//! trabajo y un vector de opciones `-nombre valor`, y recibe un código de
//! salida (o la indicación de que se mató a pedido del usuario).
use std::fmt::Display;
use std::path::PathBuf;

use crate::errors::LaunchError;
use crate::job::JobSignature;

/// Cómo terminó un proceso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Code(i32),
    /// Terminado por `kill`; distinto de un fallo reportado por el solver.
    Killed,
}

impl ProcessExit {
    pub fn success(self) -> bool {
        self == ProcessExit::Code(0)
    }
}

/// Vector de argumentos estilo archivo de opciones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    args: Vec<String>,
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, value: impl Display) -> &mut Self {
        self.args.push(format!("-{name}"));
        self.args.push(value.to_string());
        self
    }

    pub fn flag(&mut self, name: &str) -> &mut Self {
        self.args.push(format!("-{name}"));
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub signature: JobSignature,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// Lanza procesos y entrega su fin al scheduler (por canal, callback...).
pub trait ProcessLauncher {
    fn launch(&mut self, request: ProcessRequest) -> Result<(), LaunchError>;
    fn kill(&mut self, signature: &JobSignature) -> Result<(), LaunchError>;
}
