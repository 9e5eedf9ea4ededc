//! Modelo completo: partes, eventos y opciones de análisis.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisOptions;
use crate::error::DomainError;
use crate::event::{EventId, SimulationEvent};
use crate::part::{Part, PartId};
use crate::results::ResultStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    /// Directorio del modelo; se fija al cargar.
    #[serde(skip)]
    pub root: PathBuf,
    /// En orden de registro.
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub events: Vec<SimulationEvent>,
    #[serde(default)]
    pub analysis: AnalysisOptions,
    /// Resultados del modelo maestro (sin evento activo).
    #[serde(default)]
    pub master_results: ResultStatus,
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,
    #[serde(skip)]
    active_event: Option<EventId>,
    #[serde(skip)]
    master_snapshot: Option<ResultStatus>,
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Model {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self { name: name.into(),
               root: root.into(),
               parts: Vec::new(),
               events: Vec::new(),
               analysis: AnalysisOptions::default(),
               master_results: ResultStatus::default(),
               result_dir: default_result_dir(),
               active_event: None,
               master_snapshot: None }
    }

    /// Carga un modelo JSON; `root` pasa a ser el directorio del archivo.
    pub fn load(path: &Path) -> Result<Self, DomainError> {
        let text = fs::read_to_string(path).map_err(|source| DomainError::Io { path: path.to_path_buf(),
                                                                               source })?;
        let mut model: Model = serde_json::from_str(&text)?;
        model.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), DomainError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| DomainError::Io { path: path.to_path_buf(),
                                                                 source })
    }

    pub fn part(&self, id: PartId) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == id)
    }

    pub fn part_mut(&mut self, id: PartId) -> Option<&mut Part> {
        self.parts.iter_mut().find(|p| p.id == id)
    }

    /// Ids de partes en orden inverso de registro.
    pub fn parts_reverse(&self) -> Vec<PartId> {
        self.parts.iter().rev().map(|p| p.id).collect()
    }

    /// Repositorio de reducción absoluto de una parte.
    pub fn part_repository(&self, part: &Part) -> PathBuf {
        self.root.join(&part.rdb_dir)
    }

    pub fn event(&self, id: EventId) -> Option<&SimulationEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn event_mut(&mut self, id: EventId) -> Option<&mut SimulationEvent> {
        self.events.iter_mut().find(|e| e.id == id)
    }

    pub fn active_event(&self) -> Option<EventId> {
        self.active_event
    }

    /// Cambia el evento activo y devuelve el anterior.
    pub fn activate_event(&mut self, event: Option<EventId>) -> Option<EventId> {
        std::mem::replace(&mut self.active_event, event)
    }

    /// Directorio de resultados del solver para `event` (None = maestro).
    pub fn results_dir(&self, event: Option<EventId>) -> PathBuf {
        match event.and_then(|id| self.event(id)) {
            Some(ev) => self.root.join(&ev.dir).join(&self.result_dir),
            None => self.root.join(&self.result_dir),
        }
    }

    pub fn results(&self, event: Option<EventId>) -> &ResultStatus {
        match event.and_then(|id| self.event(id)) {
            Some(ev) => &ev.results,
            None => &self.master_results,
        }
    }

    pub fn results_mut(&mut self, event: Option<EventId>) -> &mut ResultStatus {
        let pos = event.and_then(|id| self.events.iter().position(|e| e.id == id));
        match pos {
            Some(i) => &mut self.events[i].results,
            None => &mut self.master_results,
        }
    }

    /// Guarda el estado actual de resultados de `event` la primera vez que
    /// se llama en la sesión; las siguientes no cambian nada.
    pub fn snapshot_results(&mut self, event: Option<EventId>) {
        let pos = event.and_then(|id| self.events.iter().position(|e| e.id == id));
        match pos {
            Some(i) => {
                let ev = &mut self.events[i];
                if !ev.touched {
                    ev.snapshot = Some(ev.results.clone());
                    ev.touched = true;
                }
            }
            None => {
                if self.master_snapshot.is_none() {
                    self.master_snapshot = Some(self.master_results.clone());
                }
            }
        }
    }

    /// Resultados previos a la primera ejecución de la sesión, si la hubo.
    pub fn results_snapshot(&self, event: Option<EventId>) -> Option<&ResultStatus> {
        match event.and_then(|id| self.event(id)) {
            Some(ev) => ev.snapshot.as_ref(),
            None => self.master_snapshot.as_ref(),
        }
    }

    /// Verificación previa a resolver. Devuelve la lista de problemas.
    pub fn pre_solve_check(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        if self.result_dir.as_os_str().is_empty() {
            problems.push("model has no result directory".to_string());
        }
        let mut seen = HashSet::new();
        let mut locations = HashSet::new();
        for part in &self.parts {
            if !seen.insert(part.id) {
                problems.push(format!("duplicate part id {}", part.id));
            }
            if part.skips_reduction() {
                continue;
            }
            if part.fe_file.is_none() && part.external_matrices.is_none() {
                problems.push(format!("{} has no FE data", part.id_string()));
            }
            if part.rdb_dir.as_os_str().is_empty() {
                problems.push(format!("{} has no result repository", part.id_string()));
            }
            let opts = &part.reduction;
            if opts.tol_eigenval <= 0.0 || opts.tol_factorize <= 0.0 {
                problems.push(format!("{} has non-positive tolerances", part.id_string()));
            }
            if let Some(base) = part.base_name() {
                if !locations.insert((part.rdb_dir.clone(), base)) {
                    problems.push(format!("{} shares its result location with another part", part.id_string()));
                }
            }
        }
        let mut seen = HashSet::new();
        for ev in &self.events {
            if !seen.insert(ev.id) {
                problems.push(format!("duplicate event id {}", ev.id));
            }
        }
        if let Some(active) = self.active_event {
            if self.event(active).is_none() {
                problems.push(format!("active event {active} does not exist"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
