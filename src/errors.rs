use thiserror::Error;

/// Why a call to the inference backend failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationFailure {
    Network,
    Timeout,
    Auth,
    Status,
}

impl std::fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvocationFailure::Network => "network",
            InvocationFailure::Timeout => "timeout",
            InvocationFailure::Auth => "authentication",
            InvocationFailure::Status => "status",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model invocation failed ({kind}): {message}")]
    ModelInvocation {
        kind: InvocationFailure,
        message: String,
    },

    #[error("Response parse error: {0}")]
    ResponseParse(String),

    #[error("Ambiguous locate for '{description}': expected exactly one element, found {matches}")]
    LocateAmbiguity { description: String, matches: usize },

    #[error("Cache identity mismatch: expected {expected}, found {found}")]
    CacheMismatch { expected: String, found: String },

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("'{description}' failed: {source}")]
    StepFailed {
        description: String,
        #[source]
        source: Box<InsightError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl InsightError {
    pub fn invocation(kind: InvocationFailure, message: impl Into<String>) -> Self {
        InsightError::ModelInvocation {
            kind,
            message: message.into(),
        }
    }

    /// Attach the description of the automation step that failed.
    pub fn for_step(self, description: &str) -> Self {
        InsightError::StepFailed {
            description: description.to_string(),
            source: Box::new(self),
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            InsightError::ModelInvocation { kind, .. } => *kind == InvocationFailure::Timeout,
            InsightError::StepFailed { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for InsightError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            InvocationFailure::Timeout
        } else if e.status().is_some() {
            InvocationFailure::Status
        } else {
            InvocationFailure::Network
        };
        InsightError::invocation(kind, e.to_string())
    }
}

impl serde::Serialize for InsightError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type InsightResult<T> = Result<T, InsightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_failure_names_the_description() {
        let err = InsightError::ResponseParse("missing field `pass`".into()).for_step("login button");
        let msg = err.to_string();
        assert!(msg.contains("login button"));
        assert!(msg.contains("missing field"));
    }

    #[test]
    fn timeout_is_distinguishable() {
        let err = InsightError::invocation(InvocationFailure::Timeout, "60s elapsed");
        assert!(err.is_timeout());
        assert!(!InsightError::invocation(InvocationFailure::Auth, "401").is_timeout());
    }
}
