//! Tipos de evento de la sesión de orquestación.
//!
//! Cada transición observable (encolado, arranque, espera, fin, batch,
//! bloqueo de partes, acierto de caché) se registra como un `SessionEvent`
//! append-only. La bitácora sirve para diagnóstico y para los tests; no
//! participa en ninguna decisión del scheduler.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{CompletionStatus, JobGroup};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEventKind {
    /// Trabajo aceptado por el scheduler.
    JobQueued { signature: String, group: JobGroup },
    /// Proceso externo lanzado.
    JobStarted { signature: String, group: JobGroup },
    /// Bloqueado por otra categoría en ejecución; se re-evalúa más tarde.
    JobWaiting { signature: String },
    JobFinished {
        signature: String,
        group: JobGroup,
        status: CompletionStatus,
        diagnostic: Option<String>,
    },
    /// Entradas de una categoría generadas sin lanzar el binario.
    BatchPrepared { group: JobGroup },
    /// Cambio del bloqueo advisory de una parte (notificación "changed").
    PartLockChanged { part: u32, locked: bool },
    /// Resultado previo reutilizado desde otro directorio `<base>_<n>`.
    CacheHit { part: u32, task_dir: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub seq: u64, // orden de append dentro de la sesión
    pub session_id: Uuid,
    pub kind: SessionEventKind,
    pub ts: DateTime<Utc>,
}
