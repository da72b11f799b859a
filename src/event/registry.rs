//! Resolves an `EventHandlerConfig` into a constructed sink. `Syslog`
//! shares its implementation with `FileSink`: both are "append one
//! formatted line to a file" sinks, and a real syslog target is
//! conventionally fed exactly that way.

use std::rc::Rc;

use thiserror::Error;

use crate::config::types::{EventHandlerConfig, EventHandlerType};
use crate::event::sinks::{FileSink, JsonLinesSink, MailSink, StdoutSink};
use crate::event::EventHandler;

#[derive(Debug, Error)]
pub enum EventHandlerBuildError {
    #[error("EventHandlers[{id}]: 'path' is required for handler type '{handler_type:?}'")]
    MissingPath { id: String, handler_type: EventHandlerType },
}

pub fn build_event_handler(config: &EventHandlerConfig) -> Result<Rc<dyn EventHandler>, EventHandlerBuildError> {
    let require_path = || {
        config.path.clone().ok_or_else(|| EventHandlerBuildError::MissingPath { id: config.id.clone(), handler_type: config.handler_type })
    };
    let handler: Rc<dyn EventHandler> = match config.handler_type {
        EventHandlerType::Stdout => Rc::new(StdoutSink),
        EventHandlerType::Syslog => Rc::new(FileSink::new(require_path()?)),
        EventHandlerType::Json => Rc::new(JsonLinesSink::new(require_path()?)),
        EventHandlerType::Mail => Rc::new(MailSink::new()),
    };
    Ok(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdout_and_mail_need_no_path() {
        let stdout = EventHandlerConfig { id: "a".to_string(), handler_type: EventHandlerType::Stdout, path: None };
        let mail = EventHandlerConfig { id: "b".to_string(), handler_type: EventHandlerType::Mail, path: None };
        assert!(build_event_handler(&stdout).is_ok());
        assert!(build_event_handler(&mail).is_ok());
    }

    #[test]
    fn json_without_path_is_rejected() {
        let config = EventHandlerConfig { id: "a".to_string(), handler_type: EventHandlerType::Json, path: None };
        assert!(matches!(build_event_handler(&config), Err(EventHandlerBuildError::MissingPath { .. })));
    }

    #[test]
    fn json_with_path_is_built() {
        let config = EventHandlerConfig { id: "a".to_string(), handler_type: EventHandlerType::Json, path: Some("/tmp/events.jsonl".into()) };
        assert!(build_event_handler(&config).is_ok());
    }
}
