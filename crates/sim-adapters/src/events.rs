//! EventStore que además agrega cada evento como una línea JSON a un archivo.
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::error;
use sim_core::{EventStore, InMemoryEventStore, SessionEvent, SessionEventKind};
use uuid::Uuid;

use crate::error::AdapterError;

pub struct JsonlEventStore {
    path: PathBuf,
    file: File,
    inner: InMemoryEventStore,
}

impl JsonlEventStore {
    /// Abre (o crea) el archivo en modo append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AdapterError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| AdapterError::Io { path: parent.to_path_buf(),
                                                                           source })?;
        }
        let file = OpenOptions::new().create(true)
                                     .append(true)
                                     .open(&path)
                                     .map_err(|source| AdapterError::Io { path: path.clone(),
                                                                          source })?;
        Ok(Self { path,
                  file,
                  inner: InMemoryEventStore::default() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lee todos los eventos de un archivo, de cualquier sesión.
    pub fn read_all(path: &Path) -> Result<Vec<SessionEvent>, AdapterError> {
        let text = fs::read_to_string(path).map_err(|source| AdapterError::Io { path: path.to_path_buf(),
                                                                                source })?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(AdapterError::from))
            .collect()
    }
}

impl EventStore for JsonlEventStore {
    fn append_kind(&mut self, session_id: Uuid, kind: SessionEventKind) -> SessionEvent {
        let ev = self.inner.append_kind(session_id, kind);
        let line = match serde_json::to_string(&ev) {
            Ok(line) => line,
            Err(e) => {
                error!("cannot encode session event: {e}");
                return ev;
            }
        };
        if let Err(e) = writeln!(self.file, "{line}") {
            error!("cannot append to {}: {e}", self.path.display());
        }
        ev
    }

    fn list(&self, session_id: Uuid) -> Vec<SessionEvent> {
        self.inner.list(session_id)
    }
}
