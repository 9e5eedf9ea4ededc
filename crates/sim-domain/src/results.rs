//! Archivos de resultados en disco.
//!
//! - `ResultFileSet`: matrices de reducción de una parte, dentro de un
//!   subdirectorio `<base>_<n>` de su repositorio.
//! - `ResultStatus`: archivos producidos por el solver dinámico en un
//!   directorio de tarea `response_NNNN`.
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisOptions;
use crate::part::Part;

/// Tipo de archivo producido por el reductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatrixKind {
    Stiffness,
    Mass,
    Gravity,
    Load,
    Recovery,
    GeneralizedModes,
    Displacement,
    NonlinearForce,
    SamData,
}

impl MatrixKind {
    pub const ALL: [MatrixKind; 9] = [MatrixKind::Stiffness,
                                      MatrixKind::Mass,
                                      MatrixKind::Gravity,
                                      MatrixKind::Load,
                                      MatrixKind::Recovery,
                                      MatrixKind::GeneralizedModes,
                                      MatrixKind::Displacement,
                                      MatrixKind::NonlinearForce,
                                      MatrixKind::SamData];

    pub fn suffix(self) -> &'static str {
        match self {
            MatrixKind::Stiffness => "_S.fmx",
            MatrixKind::Mass => "_M.fmx",
            MatrixKind::Gravity => "_G.fmx",
            MatrixKind::Load => "_L.fmx",
            MatrixKind::Recovery => "_B.fmx",
            MatrixKind::GeneralizedModes => "_E.fmx",
            MatrixKind::Displacement => "_D.fmx",
            MatrixKind::NonlinearForce => "_F.fmx",
            MatrixKind::SamData => "_SAM.fsm",
        }
    }

    pub fn file_name(self, base: &str) -> String {
        format!("{base}{}", self.suffix())
    }
}

/// Para qué se necesita la reducción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReductionPurpose {
    /// Matrices de superelemento para el solver dinámico.
    #[default]
    Dynamics,
    /// Datos de recuperación de esfuerzos/modos.
    Recovery,
    /// Todo lo que escribe el reductor (verificación post-ejecución).
    FullOutput,
}

/// Exigencia sobre un archivo concreto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Debe existir y ser válido.
    Required,
    /// Se conserva si existe y es válido; si no, se descarta sin rechazar.
    Optional,
    /// No aplica con las opciones actuales; su nombre se borra.
    Unused,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFileSet {
    /// Subdirectorio `<base>_<n>` dentro del repositorio de la parte.
    #[serde(default)]
    pub task_dir: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<MatrixKind, String>,
}

impl ResultFileSet {
    /// Qué archivos exigir para `purpose`, según las opciones de la parte y
    /// del análisis.
    pub fn required_files(part: &Part,
                          analysis: &AnalysisOptions,
                          purpose: ReductionPurpose)
                          -> BTreeMap<MatrixKind, Requirement> {
        use Requirement::*;
        let dynamics = matches!(purpose, ReductionPurpose::Dynamics | ReductionPurpose::FullOutput);
        let recovery = matches!(purpose, ReductionPurpose::Recovery | ReductionPurpose::FullOutput);
        let when = |need: bool| if need { Required } else { Optional };
        let opts = &part.reduction;

        let mut req = BTreeMap::new();
        req.insert(MatrixKind::Stiffness, when(dynamics));
        req.insert(MatrixKind::Mass, when(dynamics && analysis.need_mass_matrix()));
        req.insert(MatrixKind::Gravity, when(dynamics && analysis.gravity_is_active()));
        req.insert(MatrixKind::Load, when(dynamics && part.has_loads));
        req.insert(MatrixKind::Recovery, when(recovery));
        req.insert(MatrixKind::SamData, when(recovery));
        req.insert(MatrixKind::GeneralizedModes,
                   if opts.n_gen_modes > 0 { when(recovery) } else { Unused });
        if opts.nonlinear_reduction {
            req.insert(MatrixKind::NonlinearForce, when(dynamics));
            req.insert(MatrixKind::Displacement, when(dynamics));
        } else {
            req.insert(MatrixKind::NonlinearForce, Unused);
            req.insert(MatrixKind::Displacement,
                       if opts.n_gen_modes >= 0 { Unused } else { when(recovery) });
        }
        req
    }

    /// Número `n` del subdirectorio actual `<base>_<n>`, si lo hay.
    pub fn task_version(&self) -> Option<u32> {
        let dir = self.task_dir.as_deref()?;
        let (_, n) = dir.rsplit_once('_')?;
        n.parse().ok()
    }

    /// Apunta el conjunto a `task_dir`, con nombres derivados de `base` solo
    /// para `kinds`; el resto se borra.
    pub fn remap_to(&mut self, task_dir: impl Into<String>, base: &str, kinds: impl IntoIterator<Item = MatrixKind>) {
        self.task_dir = Some(task_dir.into());
        self.files = kinds.into_iter().map(|k| (k, k.file_name(base))).collect();
    }

    pub fn file(&self, kind: MatrixKind) -> Option<&str> {
        self.files.get(&kind).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.task_dir = None;
        self.files.clear();
    }
}

/// Archivos de resultados del solver para un evento (o el modelo maestro).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultStatus {
    pub task_name: String,
    /// 0 = todavía no hubo ejecución.
    #[serde(default)]
    pub task_ver: u32,
    /// Rutas relativas al directorio de resultados dueño.
    #[serde(default)]
    pub files: BTreeSet<PathBuf>,
}

impl Default for ResultStatus {
    fn default() -> Self {
        Self::new("response")
    }
}

impl ResultStatus {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self { task_name: task_name.into(),
               task_ver: 0,
               files: BTreeSet::new() }
    }

    pub fn task_dir_name(&self) -> String {
        format!("{}_{:04}", self.task_name, self.task_ver)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Abre un nuevo directorio de tarea y devuelve su nombre.
    pub fn bump_version(&mut self) -> String {
        self.task_ver += 1;
        self.task_dir_name()
    }

    /// Relee el contenido del último directorio de tarea bajo `base`.
    pub fn sync_from_disk(&mut self, base: &Path) -> io::Result<()> {
        self.files.clear();
        let prefix = format!("{}_", self.task_name);
        let mut latest = None;
        if base.is_dir() {
            for entry in fs::read_dir(base)? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(ver) = name.to_str()
                                    .and_then(|n| n.strip_prefix(&prefix))
                                    .and_then(|v| v.parse::<u32>().ok())
                else {
                    continue;
                };
                if entry.path().is_dir() && latest.map_or(true, |l| ver > l) {
                    latest = Some(ver);
                }
            }
        }
        let Some(ver) = latest else {
            return Ok(());
        };
        self.task_ver = self.task_ver.max(ver);
        let task_dir = base.join(self.task_dir_name());
        collect_files(base, &task_dir, &mut self.files)
    }

    pub fn absolute_files(&self, base: &Path) -> Vec<PathBuf> {
        self.files.iter().map(|f| base.join(f)).collect()
    }

    /// Borra todos los archivos registrados. Devuelve cuántos se borraron.
    pub fn remove_all_files(&mut self, base: &Path) -> io::Result<usize> {
        let mut removed = 0;
        for f in self.absolute_files(base) {
            match fs::remove_file(&f) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        self.files.clear();
        Ok(removed)
    }

    /// Elimina archivos `.frs` de tamaño cero (salida truncada de un solver
    /// que murió). Los que ya figuraban en `previous` no se tocan. Devuelve
    /// las rutas borradas.
    pub fn purge_truncated(&mut self, base: &Path, previous: Option<&ResultStatus>) -> io::Result<Vec<PathBuf>> {
        let mut purged = Vec::new();
        for rel in self.files.clone() {
            let abs = base.join(&rel);
            if rel.extension().and_then(|e| e.to_str()) != Some("frs") {
                continue;
            }
            if previous.is_some_and(|p| p.files.contains(&rel)) {
                continue;
            }
            if fs::metadata(&abs).map(|m| m.len() == 0).unwrap_or(false) {
                fs::remove_file(&abs)?;
                self.files.remove(&rel);
                purged.push(abs);
            }
        }
        Ok(purged)
    }
}

fn collect_files(base: &Path, dir: &Path, out: &mut BTreeSet<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            out.insert(rel.to_path_buf());
        }
    }
    Ok(())
}
