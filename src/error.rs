use thiserror::Error;

/// Failures that end the processing of a single trip.
///
/// None of these are fatal to a session: `ExplorerSession::view_trip` turns
/// them into a message and the next trip can still be viewed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("invalid spatial cell identifier `{0}`")]
    Decode(String),
    #[error("trip {cycle_id}: sample {index} has no timestamp and the trip has no start time")]
    MissingTimestamp { cycle_id: String, index: usize },
    #[error("invalid match request: {0}")]
    InvalidRequest(String),
    #[error("no matching route found")]
    NoMatch,
    #[error("routing service error: {status} {body}")]
    Service { status: u16, body: String },
    #[error("routing service unreachable: {0}")]
    Transport(String),
    #[error("unexpected routing service response: {0}")]
    Parse(String),
}

impl RouteError {
    /// True for the errors that come from the routing collaborator rather than
    /// from the trip's own data.
    pub fn is_service_side(&self) -> bool {
        matches!(
            self,
            RouteError::NoMatch
                | RouteError::Service { .. }
                | RouteError::Transport(_)
                | RouteError::Parse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::RouteError;

    #[test]
    fn service_error_is_verbatim() {
        let error = RouteError::Service {
            status: 400,
            body: "{\"code\":\"InvalidQuery\"}".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "routing service error: 400 {\"code\":\"InvalidQuery\"}"
        );
        assert!(error.is_service_side());
        assert!(!RouteError::Decode("abc".to_string()).is_service_side());
    }
}
