//! Opciones globales del análisis.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Solver de ecuaciones usado por el reductor. El código numérico entra en
/// el checksum de reducción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EquationSolver {
    Skyline,
    #[default]
    Sparse,
    Gsf,
}

impl EquationSolver {
    pub fn code(self) -> i32 {
        match self {
            EquationSolver::Skyline => 1,
            EquationSolver::Sparse => 2,
            EquationSolver::Gsf => 3,
        }
    }
}

/// Librería de plugin (elementos de usuario, cargas externas...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub gravity: [f64; 3],
    pub quasistatic_only: bool,
    pub eigenvalue_solve: bool,
    pub equation_solver: EquationSolver,
    /// 0 = sin límite explícito (se usa el de la sesión).
    pub max_concurrent_processes: usize,
    pub overwrite_results: bool,
    pub reducer_add_opts: String,
    pub solver_add_opts: String,
    pub auto_vtf_export: bool,
    pub vtf_file: Option<PathBuf>,
    pub plugins: Vec<PluginEntry>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self { gravity: [0.0, 0.0, -9.81],
               quasistatic_only: false,
               eigenvalue_solve: false,
               equation_solver: EquationSolver::Sparse,
               max_concurrent_processes: 0,
               overwrite_results: false,
               reducer_add_opts: String::new(),
               solver_add_opts: String::new(),
               auto_vtf_export: false,
               vtf_file: None,
               plugins: Vec::new() }
    }
}

impl AnalysisOptions {
    pub fn gravity_is_active(&self) -> bool {
        let [x, y, z] = self.gravity;
        (x * x + y * y + z * z).sqrt() > 1.0e-8
    }

    /// Dinámica o autovalores exigen matriz de masa.
    pub fn need_mass_matrix(&self) -> bool {
        !self.quasistatic_only || self.eigenvalue_solve
    }

    /// Plugins activos, resueltos contra el directorio del modelo.
    pub fn active_plugins(&self, root: &Path) -> Vec<PathBuf> {
        self.plugins.iter().filter(|p| p.active).map(|p| root.join(&p.path)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravity_threshold() {
        let mut a = AnalysisOptions::default();
        assert!(a.gravity_is_active());
        a.gravity = [0.0, 1.0e-9, 0.0];
        assert!(!a.gravity_is_active());
    }

    #[test]
    fn quasistatic_without_eigen_skips_mass() {
        let mut a = AnalysisOptions::default();
        assert!(a.need_mass_matrix());
        a.quasistatic_only = true;
        assert!(!a.need_mass_matrix());
        a.eigenvalue_solve = true;
        assert!(a.need_mass_matrix());
    }
}
