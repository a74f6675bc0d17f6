use dealchat_core::error::CoreError;

use crate::chat::protocol::{ErrorPayload, ServerEvent};
use crate::chat::store::StoreError;

/// Failure of a chat transition, reported to the initiating connection only.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Validation, not-found, and forbidden outcomes.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store rejected or failed the operation. `context` is the message
    /// shown to the client.
    #[error("{context}: {source}")]
    Persistence {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Core(CoreError::Validation(message.into()))
    }

    pub fn persistence(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Persistence { context, source }
    }

    /// The outbound `error` event for this failure.
    pub fn to_event(&self) -> ServerEvent {
        let payload = match self {
            Self::Core(CoreError::Validation(msg)) | Self::Core(CoreError::Forbidden(msg)) => {
                ErrorPayload {
                    message: msg.clone(),
                    error: None,
                }
            }
            Self::Core(CoreError::NotFound { entity, .. }) => ErrorPayload {
                message: format!("{entity} not found"),
                error: None,
            },
            Self::Persistence { context, source } => ErrorPayload {
                message: (*context).to_string(),
                error: Some(source.to_string()),
            },
        };
        ServerEvent::Error(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn validation_message_is_passed_through() {
        let event = ChatError::validation("Missing userId").to_event();
        assert_matches!(event, ServerEvent::Error(p) => {
            assert_eq!(p.message, "Missing userId");
            assert!(p.error.is_none());
        });
    }

    #[test]
    fn not_found_names_the_entity() {
        let err = ChatError::Core(CoreError::NotFound {
            entity: "Chat",
            id: "9".into(),
        });
        assert_matches!(err.to_event(), ServerEvent::Error(p) if p.message == "Chat not found");
    }

    #[test]
    fn persistence_carries_generic_message_and_detail() {
        let err = ChatError::persistence("Failed to save message")(StoreError::Unavailable(
            "connection refused".into(),
        ));
        assert_matches!(err.to_event(), ServerEvent::Error(p) => {
            assert_eq!(p.message, "Failed to save message");
            assert_eq!(p.error.as_deref(), Some("Store unavailable: connection refused"));
        });
    }
}
