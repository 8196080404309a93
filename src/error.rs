use crate::di::Key;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{key} is already registered")]
    DuplicateRegistration { key: Key },

    #[error("{}", missing_message(.key, .required_by.as_ref()))]
    MissingDependency {
        key: Key,
        required_by: Option<Key>,
    },

    #[error("constructor for {key} failed")]
    Constructor {
        key: Key,
        #[source]
        source: anyhow::Error,
    },

    #[error("circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    #[error("failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("{owner} declares no input named {field:?}")]
    UnknownField { owner: Key, field: String },

    #[error("invoke {function} failed")]
    InvokeFailed {
        function: String,
        #[source]
        source: anyhow::Error,
    },
}

fn missing_message(key: &Key, required_by: Option<&Key>) -> String {
    match required_by {
        Some(parent) => format!("{parent} dependency of type {key} is not registered"),
        None => format!("type {key} is not registered"),
    }
}

impl Error {
    /// Whether this error comes from how the graph was put together rather
    /// than from a constructor at runtime. Such errors never go away on retry.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DuplicateRegistration { .. }
                | Error::MissingDependency { .. }
                | Error::CircularDependency { .. }
                | Error::UnknownField { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Handler;
    struct Database;

    #[test]
    fn test_missing_dependency_names_requester() {
        let err = Error::MissingDependency {
            key: Key::of::<Database>(),
            required_by: Some(Key::of::<Handler>()),
        };
        let message = err.to_string();
        assert!(message.contains("Handler dependency of type"));
        assert!(message.contains("Database is not registered"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_constructor_error_keeps_source() {
        let err = Error::Constructor {
            key: Key::of::<Database>(),
            source: anyhow::anyhow!("connection refused"),
        };
        assert!(err.to_string().ends_with("failed"));
        assert!(!err.is_configuration());

        let report = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(report.matches("connection refused").count(), 1);
    }

    #[test]
    fn test_messages_are_lowercase_and_cause_printed_once() {
        let errors = [
            Error::CircularDependency {
                cycle: "A -> B -> A".into(),
            },
            Error::DowncastFailed {
                type_name: "Database".into(),
            },
            Error::UnknownField {
                owner: Key::of::<Handler>(),
                field: "db".into(),
            },
        ];
        for err in errors {
            let message = err.to_string();
            assert!(message.starts_with(char::is_lowercase), "{message}");
        }

        let err = Error::InvokeFailed {
            function: "serve".into(),
            source: anyhow::anyhow!("port in use"),
        };
        assert_eq!(err.to_string(), "invoke serve failed");
        let report = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(report, "invoke serve failed: port in use");
    }
}
