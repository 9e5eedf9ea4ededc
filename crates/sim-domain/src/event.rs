//! Evento de simulación: variante del modelo con su propio directorio de
//! resultados.
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::results::ResultStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub id: EventId,
    pub name: String,
    /// Directorio del evento, relativo al modelo.
    pub dir: PathBuf,
    #[serde(default)]
    pub results: ResultStatus,
    /// El solver ya se lanzó sobre este evento en la sesión actual.
    #[serde(skip)]
    pub touched: bool,
    /// Estado de `results` (releído del disco) antes del primer lanzamiento
    /// de la sesión.
    #[serde(skip)]
    pub snapshot: Option<ResultStatus>,
}

impl SimulationEvent {
    pub fn new(id: u32, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self { id: EventId(id),
               name: name.into(),
               dir: dir.into(),
               results: ResultStatus::default(),
               touched: false,
               snapshot: None }
    }
}
