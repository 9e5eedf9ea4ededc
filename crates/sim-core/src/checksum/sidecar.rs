//! Sidecar `<base>.chk`: registra el checksum con el que se produjo un
//! directorio de resultados.
//!
//! Formato actual (revisión 2): JSON `{"revision":2,"checksum":"<hex>"}`.
//! Revisión 1 (legacy): un entero decimal en texto plano.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::constants::{SIDECAR_EXTENSION, SIDECAR_REVISION};
use crate::errors::SidecarError;
use crate::hashing::Checksum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumSidecar {
    pub revision: u32,
    pub checksum: Checksum,
}

#[derive(Serialize, Deserialize)]
struct SidecarRepr {
    revision: u32,
    checksum: String,
}

impl ChecksumSidecar {
    pub fn current(checksum: Checksum) -> Self {
        Self { revision: SIDECAR_REVISION,
               checksum }
    }

    pub fn is_legacy(&self) -> bool {
        self.revision < SIDECAR_REVISION
    }

    pub fn path_for(dir: &Path, base: &str) -> PathBuf {
        dir.join(format!("{base}.{SIDECAR_EXTENSION}"))
    }

    /// Lee el sidecar. `Ok(None)` si no existe o no se puede interpretar.
    pub fn read(path: &Path) -> Result<Option<Self>, SidecarError> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SidecarError::Io { path: path.to_path_buf(),
                                                         source }),
        };
        let text = text.trim();
        if let Ok(repr) = serde_json::from_str::<SidecarRepr>(text) {
            if let Ok(checksum) = u64::from_str_radix(&repr.checksum, 16) {
                return Ok(Some(Self { revision: repr.revision,
                                      checksum }));
            }
        } else if let Ok(checksum) = text.parse::<u64>() {
            return Ok(Some(Self { revision: 1,
                                  checksum }));
        }
        warn!("unreadable checksum sidecar {}, ignored", path.display());
        Ok(None)
    }

    pub fn write(&self, path: &Path) -> Result<(), SidecarError> {
        let repr = SidecarRepr { revision: self.revision,
                                 checksum: format!("{:016x}", self.checksum) };
        let text = serde_json::to_string(&repr).map_err(|e| SidecarError::Encode(e.to_string()))?;
        fs::write(path, text).map_err(|source| SidecarError::Io { path: path.to_path_buf(),
                                                                  source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_plain_integer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arm.chk");
        fs::write(&path, "12345\n").unwrap();
        let sc = ChecksumSidecar::read(&path).unwrap().unwrap();
        assert!(sc.is_legacy());
        assert_eq!(sc.checksum, 12345);
    }

    #[test]
    fn garbage_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arm.chk");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(ChecksumSidecar::read(&path).unwrap(), None);
        assert_eq!(ChecksumSidecar::read(&dir.path().join("none.chk")).unwrap(), None);
    }

    #[test]
    fn write_then_read_current_revision() {
        let dir = tempfile::tempdir().unwrap();
        let path = ChecksumSidecar::path_for(dir.path(), "arm");
        ChecksumSidecar::current(u64::MAX - 3).write(&path).unwrap();
        let sc = ChecksumSidecar::read(&path).unwrap().unwrap();
        assert!(!sc.is_legacy());
        assert_eq!(sc.checksum, u64::MAX - 3);
    }
}
