//! Event-action definitions.
//!
//! Each definition binds an event of an application process to a stored request. When the event
//! is raised, the request of the first enabled definition for that event is returned for
//! execution.
use super::monitoring::EventId;
use super::ErrorCode;
use alloc::vec::Vec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

pub const DEFAULT_EVENT_ACTION_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventActionDefinition {
    pub application_id: u16,
    pub event_id: EventId,
    pub enabled: bool,
    /// Raw telecommand executed when the event is raised.
    pub request: Vec<u8>,
}

impl EventActionDefinition {
    /// Definitions are disabled after creation.
    pub fn new(application_id: u16, event_id: EventId, request: Vec<u8>) -> Self {
        Self {
            application_id,
            event_id,
            enabled: false,
            request,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventActionError {
    #[error("no event-action definition for application {application_id} and event {event_id}")]
    UnknownDefinition {
        application_id: u16,
        event_id: EventId,
    },
    #[error("event-action definition for application {application_id} and event {event_id} exists")]
    DefinitionExists {
        application_id: u16,
        event_id: EventId,
    },
    #[error("event-action definition for application {application_id} and event {event_id} is enabled")]
    DefinitionEnabled {
        application_id: u16,
        event_id: EventId,
    },
    #[error("event-action table full")]
    TableFull,
}

impl EventActionError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            EventActionError::UnknownDefinition { .. } => ErrorCode::UnknownEventActionDefinition,
            EventActionError::DefinitionExists { .. } => ErrorCode::EventActionDefinitionExists,
            EventActionError::DefinitionEnabled { .. } => ErrorCode::EventActionDefinitionEnabled,
            EventActionError::TableFull => ErrorCode::TableFull,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventActionTable {
    definitions: Vec<EventActionDefinition>,
    capacity: usize,
    function_enabled: bool,
}

impl Default for EventActionTable {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_ACTION_CAPACITY)
    }
}

impl EventActionTable {
    /// The event-action function is enabled after creation.
    pub fn new(capacity: usize) -> Self {
        Self {
            definitions: Vec::new(),
            capacity,
            function_enabled: true,
        }
    }

    fn position(&self, application_id: u16, event_id: EventId) -> Option<usize> {
        self.definitions
            .iter()
            .position(|d| d.application_id == application_id && d.event_id == event_id)
    }

    pub fn add(&mut self, definition: EventActionDefinition) -> Result<(), EventActionError> {
        if self
            .position(definition.application_id, definition.event_id)
            .is_some()
        {
            return Err(EventActionError::DefinitionExists {
                application_id: definition.application_id,
                event_id: definition.event_id,
            });
        }
        if self.definitions.len() >= self.capacity {
            return Err(EventActionError::TableFull);
        }
        debug!(
            application_id = definition.application_id,
            event_id = definition.event_id,
            "adding event-action definition"
        );
        self.definitions.push(definition);
        Ok(())
    }

    /// Only disabled definitions can be deleted.
    pub fn delete(
        &mut self,
        application_id: u16,
        event_id: EventId,
    ) -> Result<EventActionDefinition, EventActionError> {
        let idx = self
            .position(application_id, event_id)
            .ok_or(EventActionError::UnknownDefinition {
                application_id,
                event_id,
            })?;
        if self.definitions[idx].enabled {
            return Err(EventActionError::DefinitionEnabled {
                application_id,
                event_id,
            });
        }
        Ok(self.definitions.remove(idx))
    }

    /// Delete all definitions, enabled or not.
    pub fn delete_all(&mut self) {
        self.definitions.clear();
    }

    fn set_enabled(
        &mut self,
        application_id: u16,
        event_id: EventId,
        enabled: bool,
    ) -> Result<(), EventActionError> {
        let idx = self
            .position(application_id, event_id)
            .ok_or(EventActionError::UnknownDefinition {
                application_id,
                event_id,
            })?;
        self.definitions[idx].enabled = enabled;
        Ok(())
    }

    pub fn enable(&mut self, application_id: u16, event_id: EventId) -> Result<(), EventActionError> {
        self.set_enabled(application_id, event_id, true)
    }

    pub fn disable(
        &mut self,
        application_id: u16,
        event_id: EventId,
    ) -> Result<(), EventActionError> {
        self.set_enabled(application_id, event_id, false)
    }

    pub fn get(&self, application_id: u16, event_id: EventId) -> Option<&EventActionDefinition> {
        self.position(application_id, event_id)
            .map(|idx| &self.definitions[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventActionDefinition> {
        self.definitions.iter()
    }

    #[inline]
    pub fn is_function_enabled(&self) -> bool {
        self.function_enabled
    }

    pub fn enable_function(&mut self) {
        self.function_enabled = true;
    }

    pub fn disable_function(&mut self) {
        self.function_enabled = false;
    }

    /// Request of the first enabled definition for the event. Returns [None] if the
    /// event-action function is disabled or no enabled definition exists.
    pub fn execute(&self, event_id: EventId) -> Option<Vec<u8>> {
        if !self.function_enabled {
            return None;
        }
        let definition = self
            .definitions
            .iter()
            .find(|d| d.event_id == event_id && d.enabled)?;
        trace!(
            event_id,
            application_id = definition.application_id,
            "executing event-action"
        );
        Some(definition.request.clone())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_execute_first_enabled() {
        let mut table = EventActionTable::default();
        table
            .add(EventActionDefinition::new(1, 10, vec![1]))
            .unwrap();
        table
            .add(EventActionDefinition::new(2, 10, vec![2]))
            .unwrap();
        assert_eq!(table.execute(10), None);
        table.enable(2, 10).unwrap();
        assert_eq!(table.execute(10), Some(vec![2]));
        table.enable(1, 10).unwrap();
        assert_eq!(table.execute(10), Some(vec![1]));
        assert_eq!(table.execute(11), None);
        table.disable_function();
        assert_eq!(table.execute(10), None);
    }

    #[test]
    fn test_duplicate_and_capacity() {
        let mut table = EventActionTable::new(1);
        table.add(EventActionDefinition::new(1, 1, vec![])).unwrap();
        assert_eq!(
            table
                .add(EventActionDefinition::new(1, 1, vec![]))
                .unwrap_err(),
            EventActionError::DefinitionExists {
                application_id: 1,
                event_id: 1
            }
        );
        assert_eq!(
            table
                .add(EventActionDefinition::new(1, 2, vec![]))
                .unwrap_err(),
            EventActionError::TableFull
        );
    }

    #[test]
    fn test_delete_requires_disabled() {
        let mut table = EventActionTable::default();
        table.add(EventActionDefinition::new(3, 4, vec![5])).unwrap();
        table.enable(3, 4).unwrap();
        let err = table.delete(3, 4).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::EventActionDefinitionEnabled);
        table.disable(3, 4).unwrap();
        assert_eq!(table.delete(3, 4).unwrap().request, vec![5]);
        assert!(table.is_empty());
        assert!(matches!(
            table.enable(3, 4),
            Err(EventActionError::UnknownDefinition { .. })
        ));
    }
}
