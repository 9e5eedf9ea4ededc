use std::ops::{Deref, DerefMut};

use log::debug;
use sim_domain::EventId;

use super::Environment;

/// Activa un evento mientras vive y restaura el anterior al soltarse, también
/// en las salidas tempranas.
pub struct ActiveEventScope<'e, 'a> {
    env: &'e mut Environment<'a>,
    previous: Option<EventId>,
}

impl<'e, 'a> ActiveEventScope<'e, 'a> {
    pub fn enter(env: &'e mut Environment<'a>, event: Option<EventId>) -> Self {
        let previous = env.model.activate_event(event);
        Self { env, previous }
    }
}

impl<'a> Deref for ActiveEventScope<'_, 'a> {
    type Target = Environment<'a>;

    fn deref(&self) -> &Self::Target {
        self.env
    }
}

impl DerefMut for ActiveEventScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.env
    }
}

impl Drop for ActiveEventScope<'_, '_> {
    fn drop(&mut self) {
        let left = self.env.model.activate_event(self.previous);
        debug!("active event restored: {:?} -> {:?}", left, self.previous);
    }
}
