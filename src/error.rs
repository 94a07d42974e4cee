use thiserror::Error;

use crate::object::{Direction, ObjectId, ObjectKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dependency cycle detected among: {}", join_ids(.0))]
    Cycle(Vec<ObjectId>),

    #[error("{object} depends on {dependency}, which is not declared")]
    UnknownDependency {
        object: ObjectId,
        dependency: ObjectId,
    },

    #[error("object not declared: {0}")]
    UnknownObject(String),

    #[error("invalid object identifier: {0}")]
    InvalidIdentifier(String),

    #[error("{backend} does not support {kind} objects ({object})")]
    UnsupportedObjectKind {
        backend: &'static str,
        kind: ObjectKind,
        object: ObjectId,
    },

    #[error("no {direction} script found for {object}")]
    MissingScript {
        object: ObjectId,
        direction: Direction,
    },

    #[error("{0} requires a target object")]
    MissingTarget(ObjectId),

    #[error("unresolved variables: {}", .0.join(", "))]
    UnresolvedVariable(Vec<String>),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("statement {label} failed: {message}")]
    Statement { label: String, message: String },

    #[error("{backend} does not support {operation}")]
    UnsupportedOperation {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("unknown adapter: {0}")]
    UnknownAdapter(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{object} failed: {source}{}", completed_suffix(.completed))]
    RunFailed {
        object: ObjectId,
        /// Objects that were successfully processed before the failure.
        completed: Vec<ObjectId>,
        #[source]
        source: Box<Error>,
    },

    /// Reading or interpolating an object's script failed before execution.
    #[error("{direction} script for {object}: {source}")]
    Script {
        object: ObjectId,
        direction: Direction,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// True when the failure came from a dropped connection and the caller
    /// may reconnect and retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ConnectionLost(_) => true,
            Error::RunFailed { source, .. } | Error::Script { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

fn join_ids(ids: &[ObjectId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn completed_suffix(completed: &[ObjectId]) -> String {
    if completed.is_empty() {
        String::new()
    } else {
        format!(" (completed: {})", join_ids(completed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let users = ObjectId::new(ObjectKind::Table, "users");
        let posts = ObjectId::new(ObjectKind::Table, "posts");

        assert_eq!(
            Error::Cycle(vec![users.clone(), posts.clone()]).to_string(),
            "dependency cycle detected among: table:users, table:posts"
        );
        assert_eq!(
            Error::UnresolvedVariable(vec!["owner".to_string()]).to_string(),
            "unresolved variables: owner"
        );
        assert_eq!(
            Error::Script {
                object: users.clone(),
                direction: Direction::Apply,
                source: Box::new(Error::UnresolvedVariable(vec!["owner".to_string()])),
            }
            .to_string(),
            "apply script for table:users: unresolved variables: owner"
        );
        assert_eq!(
            Error::RunFailed {
                object: posts.clone(),
                completed: vec![],
                source: Box::new(Error::ConnectionLost("broken pipe".to_string())),
            }
            .to_string(),
            "table:posts failed: connection lost: broken pipe"
        );
        assert_eq!(
            Error::RunFailed {
                object: posts,
                completed: vec![users],
                source: Box::new(Error::Statement {
                    label: "table:posts".to_string(),
                    message: "syntax error".to_string(),
                }),
            }
            .to_string(),
            "table:posts failed: statement table:posts failed: syntax error (completed: table:users)"
        );
    }

    #[test]
    fn transient_errors_survive_wrapping() {
        let lost = Error::ConnectionLost("server has gone away".to_string());
        assert!(lost.is_transient());

        let wrapped = Error::RunFailed {
            object: ObjectId::new(ObjectKind::View, "v"),
            completed: vec![],
            source: Box::new(lost),
        };
        assert!(wrapped.is_transient());

        let statement = Error::Statement {
            label: "x".to_string(),
            message: "syntax error".to_string(),
        };
        assert!(!statement.is_transient());
    }
}
