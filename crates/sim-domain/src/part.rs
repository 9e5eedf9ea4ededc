//! Parte estructural (FE part) y sus opciones de reducción.
//!
//! Una parte se reduce (superelemento) antes de que el solver dinámico la
//! pueda usar. Los archivos de la reducción viven en su repositorio de
//! resultados (`rdb_dir`), dentro de subdirectorios `<base>_<n>`.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DomainError;
use crate::results::ResultFileSet;

/// Identificador estable de una parte dentro del modelo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartId(pub u32);

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// Nivel de bloqueo de una parte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockLevel {
    /// Edición libre.
    #[default]
    AllowModifications,
    /// Bloqueo temporal mientras el reductor externo trabaja sobre la parte.
    DenyAllLinkMod,
    /// La parte no puede usarse (ni reducirse) en absoluto.
    DenyLinkUsage,
}

/// Matrices importadas de otra herramienta (no se reducen aquí).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMatrices {
    pub stiffness: PathBuf,
    pub mass: PathBuf,
    #[serde(default)]
    pub gravity: Option<PathBuf>,
}

impl ExternalMatrices {
    pub fn all_exist(&self, root: &Path) -> bool {
        let exists = |p: &Path| root.join(p).is_file();
        exists(self.stiffness.as_path())
        && exists(self.mass.as_path())
        && self.gravity.as_deref().map_or(true, exists)
    }
}

/// Opciones que entran en el checksum de reducción.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionOptions {
    /// Número de modos componentes (negativo = sin modos, recuperación por
    /// desplazamientos).
    pub n_gen_modes: i32,
    pub n_eigvals_calc: i32,
    pub tol_eigenval: f64,
    pub tol_factorize: f64,
    pub consistent_mass: bool,
    pub factorize_mass_in_eigensolver: bool,
    pub nonlinear_reduction: bool,
    pub nonlinear_solutions: u32,
}

impl Default for ReductionOptions {
    fn default() -> Self {
        Self { n_gen_modes: 0,
               n_eigvals_calc: 0,
               tol_eigenval: 1.0e-8,
               tol_factorize: 1.0e-12,
               consistent_mass: false,
               factorize_mass_in_eigensolver: true,
               nonlinear_reduction: false,
               nonlinear_solutions: 0 }
    }
}

impl ReductionOptions {
    /// Cantidad de autovalores a calcular (0 si no hay modos componentes).
    pub fn eigenvalues_to_compute(&self) -> i32 {
        if self.n_gen_modes > 0 {
            self.n_eigvals_calc.max(self.n_gen_modes)
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    /// Archivo de datos FE, relativo al directorio del modelo.
    #[serde(default)]
    pub fe_file: Option<PathBuf>,
    /// Repositorio de resultados de reducción, relativo al modelo.
    pub rdb_dir: PathBuf,
    /// Checksum de la definición FE (None = datos FE no cargados aún).
    #[serde(default)]
    pub definition_checksum: Option<u64>,
    #[serde(default)]
    pub use_generic_properties: bool,
    #[serde(default)]
    pub suppress_in_solver: bool,
    #[serde(default)]
    pub external_matrices: Option<ExternalMatrices>,
    #[serde(default)]
    pub lock_level: LockLevel,
    #[serde(default)]
    pub reduction: ReductionOptions,
    /// Fuerza a confiar en los archivos existentes sin verificar checksum.
    #[serde(default)]
    pub override_checksum: bool,
    #[serde(default)]
    pub has_loads: bool,
    #[serde(default)]
    pub result_files: ResultFileSet,
    /// Estados producidos por una reducción no lineal.
    #[serde(default)]
    pub nonlinear_states: u32,
    #[serde(skip)]
    pub needs_save: bool,
}

impl Part {
    pub fn new(id: u32, name: impl Into<String>, rdb_dir: impl Into<PathBuf>) -> Self {
        Self { id: PartId(id),
               name: name.into(),
               fe_file: None,
               rdb_dir: rdb_dir.into(),
               definition_checksum: None,
               use_generic_properties: false,
               suppress_in_solver: false,
               external_matrices: None,
               lock_level: LockLevel::AllowModifications,
               reduction: ReductionOptions::default(),
               override_checksum: false,
               has_loads: false,
               result_files: ResultFileSet::default(),
               nonlinear_states: 0,
               needs_save: false }
    }

    /// Texto para mensajes de usuario, p.ej. `Part [3] "bracket"`.
    pub fn id_string(&self) -> String {
        format!("Part {} \"{}\"", self.id, self.name)
    }

    /// Nombre base de los archivos de reducción (stem del archivo FE).
    pub fn base_name(&self) -> Option<String> {
        let stem = self.fe_file.as_ref()?.file_stem()?.to_str()?;
        if stem.is_empty() {
            None
        } else {
            Some(stem.to_string())
        }
    }

    /// True si la parte no requiere reducción (genérica o suprimida).
    pub fn skips_reduction(&self) -> bool {
        self.use_generic_properties || self.suppress_in_solver
    }

    pub fn is_locked(&self) -> bool {
        self.lock_level != LockLevel::AllowModifications
    }

    /// Toda mutación externa debe pasar por aquí primero.
    pub fn ensure_modifiable(&self) -> Result<(), DomainError> {
        if self.is_locked() {
            return Err(DomainError::Locked(self.id_string()));
        }
        Ok(())
    }

    /// Lee el archivo FE y fija `definition_checksum`.
    pub fn load_fe_data(&mut self, model_root: &Path) -> Result<u64, DomainError> {
        let Some(fe) = self.fe_file.as_ref() else {
            return Err(DomainError::ValidationError(format!("{} has no FE data file", self.id_string())));
        };
        let path = model_root.join(fe);
        let bytes = fs::read(&path).map_err(|source| DomainError::Io { path, source })?;
        let digest = Sha256::digest(&bytes);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        // 0 se reserva para "sin checksum"
        let cs = u64::from_le_bytes(head).max(1);
        self.definition_checksum = Some(cs);
        Ok(cs)
    }
}
