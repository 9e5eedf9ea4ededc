//! Generación de archivos de entrada (colaborador externo).
use std::path::{Path, PathBuf};

use sim_domain::{EventId, Model, Part};

use crate::errors::InputError;
use crate::hashing::Checksum;

/// Lo necesario para escribir la entrada del reductor de una parte.
#[derive(Debug)]
pub struct ReducerInput<'a> {
    pub tool: &'a str,
    pub work_dir: &'a Path,
    pub part: &'a Part,
    pub base_name: &'a str,
    pub fe_path: PathBuf,
    pub checksum: Option<Checksum>,
    pub equation_solver: i32,
    pub add_opts: &'a str,
}

#[derive(Debug)]
pub struct SolverInput<'a> {
    pub tool: &'a str,
    pub work_dir: &'a Path,
    pub model: &'a Model,
    pub event: Option<EventId>,
    pub plugins: &'a [PathBuf],
    pub add_opts: &'a str,
}

pub trait InputGenerator {
    fn write_reducer_input(&self, input: &ReducerInput<'_>) -> Result<(), InputError>;
    fn write_solver_input(&self, input: &SolverInput<'_>) -> Result<(), InputError>;
    /// Cabecera de visualización del modelo sin deformar.
    fn export_baseline_vtf(&self, model: &Model, target: &Path) -> Result<(), InputError>;
}
