//! Registro de la sesión: contadores y memoria de fallos que en una
//! aplicación de escritorio serían estáticos de clase.
use std::collections::BTreeSet;

use log::debug;
use sim_domain::PartId;
use uuid::Uuid;

use crate::event::{EventStore, InMemoryEventStore, SessionEvent, SessionEventKind};

pub struct SessionRegistry {
    id: Uuid,
    attempts: u64,
    failed_parts: BTreeSet<PartId>,
    events: Box<dyn EventStore>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Box::new(InMemoryEventStore::default()))
    }
}

impl SessionRegistry {
    pub fn new(events: Box<dyn EventStore>) -> Self {
        Self { id: Uuid::new_v4(),
               attempts: 0,
               failed_parts: BTreeSet::new(),
               events }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Contador monótono para nombres de tarea sintetizados.
    pub fn next_attempt(&mut self) -> u64 {
        self.attempts += 1;
        self.attempts
    }

    /// La parte no se reintenta hasta `clear_failures`.
    pub fn mark_failed(&mut self, part: PartId) {
        debug!("part {part} marked as failed for this session");
        self.failed_parts.insert(part);
    }

    pub fn has_failed(&self, part: PartId) -> bool {
        self.failed_parts.contains(&part)
    }

    pub fn clear_failures(&mut self) {
        self.failed_parts.clear();
    }

    pub fn record(&mut self, kind: SessionEventKind) -> SessionEvent {
        self.events.append_kind(self.id, kind)
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.list(self.id)
    }
}
