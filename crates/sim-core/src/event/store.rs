use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use super::{SessionEvent, SessionEventKind};

/// Almacenamiento de eventos append-only.
pub trait EventStore: Send {
    /// Agrega un evento a partir de su kind y devuelve el evento completo.
    fn append_kind(&mut self, session_id: Uuid, kind: SessionEventKind) -> SessionEvent;
    /// Eventos de una sesión, en orden de seq.
    fn list(&self, session_id: Uuid) -> Vec<SessionEvent>;
}

#[derive(Default)]
pub struct InMemoryEventStore {
    pub inner: HashMap<Uuid, Vec<SessionEvent>>,
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&mut self, session_id: Uuid, kind: SessionEventKind) -> SessionEvent {
        let events = self.inner.entry(session_id).or_default();
        let ev = SessionEvent { seq: events.len() as u64,
                                session_id,
                                kind,
                                ts: Utc::now() };
        events.push(ev.clone());
        ev
    }

    fn list(&self, session_id: Uuid) -> Vec<SessionEvent> {
        self.inner.get(&session_id).cloned().unwrap_or_default()
    }
}
