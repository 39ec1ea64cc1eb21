use thiserror::Error;

/// Status reported when a backend answers without a result or data payload.
pub const BACKEND_UNAVAILABLE_STATUS: u16 = 500;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid short code `{0}`: expected letters and digits only")]
    InvalidShortCode(String),
}

/// Classification outcomes that must reach an operator. They are still
/// acknowledged to the chat platform.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("unknown or missing application id `{}` (expected `{expected}`)", received.as_deref().unwrap_or("<missing>"))]
    ApplicationMismatch { expected: String, received: Option<String> },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error("issue backend unavailable (status {status}): {message}")]
    BackendUnavailable { status: u16, message: String },
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Transient failures a later redelivery could succeed on.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. } | Self::Integration(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Classification(_) | Self::Configuration(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn not_found(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::NotFound { message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "No response is configured for that code.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Unsupported(message) => Self::BadRequest { message, correlation_id },
            ApplicationError::BackendUnavailable { message, .. }
            | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Classification(error) => {
                Self::Internal { message: error.to_string(), correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{
        ApplicationError, ClassificationError, DomainError, InterfaceError,
        BACKEND_UNAVAILABLE_STATUS,
    };

    #[test]
    fn invalid_short_code_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::InvalidShortCode("a-b".to_owned()))
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn backend_unavailable_is_retryable_and_maps_to_service_unavailable() {
        let error = ApplicationError::BackendUnavailable {
            status: BACKEND_UNAVAILABLE_STATUS,
            message: "no data in sheet response".to_owned(),
        };
        assert!(error.is_retryable());
        assert!(!error.is_fatal());

        let interface = error.into_interface("req-2");
        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn application_mismatch_is_fatal_and_names_both_ids() {
        let error = ApplicationError::from(ClassificationError::ApplicationMismatch {
            expected: "A123".to_owned(),
            received: Some("B999".to_owned()),
        });

        assert!(error.is_fatal());
        assert!(!error.is_retryable());
        let message = error.to_string();
        assert!(message.contains("A123"));
        assert!(message.contains("B999"));
    }

    #[test]
    fn missing_application_id_renders_placeholder() {
        let error = ClassificationError::ApplicationMismatch {
            expected: "A123".to_owned(),
            received: None,
        };
        assert!(error.to_string().contains("<missing>"));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("missing webhook url".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn not_found_has_user_safe_message() {
        let interface = InterfaceError::not_found("no mapping for `bye`", "req-5");
        assert_eq!(interface.user_message(), "No response is configured for that code.");
        assert_eq!(interface.correlation_id(), "req-5");
    }
}
