//! Validación archivo por archivo y por directorio de resultados.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::warn;
use sim_domain::{MatrixKind, Requirement, ResultFileSet};

use super::ChecksumSidecar;
use crate::hashing::Checksum;

/// Resultado de validar un archivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileValidity {
    Missing,
    Invalid,
    ValidExact,
    /// Existe, pero no había checksum esperado con qué comparar.
    ValidNoChecksum,
    /// El sidecar es de una revisión anterior y no es comparable.
    ValidLegacyMismatch,
}

impl FileValidity {
    pub fn is_valid(self) -> bool {
        matches!(self,
                 FileValidity::ValidExact | FileValidity::ValidNoChecksum | FileValidity::ValidLegacyMismatch)
    }
}

/// Qué rutas optimistas se aceptan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeniencyPolicy {
    pub accept_unverified: bool,
    pub accept_legacy: bool,
}

impl Default for LeniencyPolicy {
    fn default() -> Self {
        Self { accept_unverified: true,
               accept_legacy: true }
    }
}

impl LeniencyPolicy {
    pub fn strict() -> Self {
        Self { accept_unverified: false,
               accept_legacy: false }
    }
}

/// Veredicto sobre un directorio completo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirVerdict {
    pub files: BTreeMap<MatrixKind, FileValidity>,
    /// Requeridos que no existen.
    pub missing: Vec<MatrixKind>,
    /// Requeridos que existen pero no validan.
    pub invalid: Vec<MatrixKind>,
}

impl DirVerdict {
    /// `tolerate_missing` se usa al preparar ejecución batch: los archivos
    /// ausentes se asumen presentes cuando el batch corra.
    pub fn accepted(&self, tolerate_missing: bool) -> bool {
        self.invalid.is_empty() && (tolerate_missing || self.missing.is_empty())
    }

    /// Tipos a conservar al remapear el conjunto a este directorio.
    pub fn kept(&self, tolerate_missing: bool) -> Vec<MatrixKind> {
        self.files
            .iter()
            .filter(|(kind, v)| v.is_valid() || (tolerate_missing && self.missing.contains(kind)))
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn has_unverified(&self) -> bool {
        self.files.values().any(|v| *v == FileValidity::ValidNoChecksum)
    }

    pub fn has_legacy(&self) -> bool {
        self.files.values().any(|v| *v == FileValidity::ValidLegacyMismatch)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecksumValidator {
    pub policy: LeniencyPolicy,
}

impl ChecksumValidator {
    pub fn new(policy: LeniencyPolicy) -> Self {
        Self { policy }
    }

    pub fn validate_file(&self, path: &Path, sidecar: Option<&ChecksumSidecar>, wanted: Option<Checksum>) -> FileValidity {
        let Ok(meta) = fs::metadata(path) else {
            return FileValidity::Missing;
        };
        if !meta.is_file() || meta.len() == 0 {
            return FileValidity::Invalid;
        }
        let Some(wanted) = wanted else {
            return if self.policy.accept_unverified {
                FileValidity::ValidNoChecksum
            } else {
                FileValidity::Invalid
            };
        };
        match sidecar {
            None => FileValidity::Invalid,
            Some(sc) if sc.is_legacy() && sc.checksum != wanted => {
                if self.policy.accept_legacy {
                    FileValidity::ValidLegacyMismatch
                } else {
                    FileValidity::Invalid
                }
            }
            Some(sc) if sc.checksum == wanted => FileValidity::ValidExact,
            Some(_) => FileValidity::Invalid,
        }
    }

    /// Valida los archivos `<base><suffix>` de `dir` según `reqs`. Los tipos
    /// `Unused` no participan.
    pub fn validate_in_dir(&self,
                           dir: &Path,
                           base: &str,
                           reqs: &BTreeMap<MatrixKind, Requirement>,
                           wanted: Option<Checksum>)
                           -> DirVerdict {
        let sidecar = match ChecksumSidecar::read(&ChecksumSidecar::path_for(dir, base)) {
            Ok(sc) => sc,
            Err(e) => {
                warn!("{e}");
                None
            }
        };
        self.collect(reqs, |kind| self.validate_file(&dir.join(kind.file_name(base)), sidecar.as_ref(), wanted))
    }

    /// Solo existencia (checksum ignorado por el usuario).
    pub fn check_existence(&self, dir: &Path, base: &str, reqs: &BTreeMap<MatrixKind, Requirement>) -> DirVerdict {
        self.collect(reqs, |kind| {
                if dir.join(kind.file_name(base)).is_file() {
                    FileValidity::ValidNoChecksum
                } else {
                    FileValidity::Missing
                }
            })
    }

    fn collect(&self, reqs: &BTreeMap<MatrixKind, Requirement>, check: impl Fn(MatrixKind) -> FileValidity) -> DirVerdict {
        let mut verdict = DirVerdict::default();
        for (&kind, &req) in reqs {
            if req == Requirement::Unused {
                continue;
            }
            let v = check(kind);
            verdict.files.insert(kind, v);
            if req == Requirement::Required {
                match v {
                    FileValidity::Missing => verdict.missing.push(kind),
                    FileValidity::Invalid => verdict.invalid.push(kind),
                    _ => {}
                }
            }
        }
        verdict
    }
}

/// Validación in situ del conjunto registrado en una parte.
pub trait ValidateFileSet {
    /// `None` si el conjunto no apunta a ningún directorio.
    fn validate(&self,
                repository: &Path,
                base: &str,
                reqs: &BTreeMap<MatrixKind, Requirement>,
                validator: &ChecksumValidator,
                wanted: Option<Checksum>)
                -> Option<DirVerdict>;
}

impl ValidateFileSet for ResultFileSet {
    fn validate(&self,
                repository: &Path,
                base: &str,
                reqs: &BTreeMap<MatrixKind, Requirement>,
                validator: &ChecksumValidator,
                wanted: Option<Checksum>)
                -> Option<DirVerdict> {
        let dir = repository.join(self.task_dir.as_deref()?);
        Some(validator.validate_in_dir(&dir, base, reqs, wanted))
    }
}
