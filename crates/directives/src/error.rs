/// Crate-wide result type for directive routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while wiring handlers into a [`crate::HandlerRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another handler already owns this directive kind.
    #[error("directive {kind} is already routed to handler {existing}")]
    DuplicateRoute { kind: String, existing: String },

    /// A handler was registered without declaring any directive kinds.
    #[error("handler {handler} declares no directives")]
    EmptyConfiguration { handler: String },
}

impl Error {
    #[must_use]
    pub fn duplicate_route(kind: impl std::fmt::Display, existing: impl Into<String>) -> Self {
        Self::DuplicateRoute {
            kind: kind.to_string(),
            existing: existing.into(),
        }
    }

    #[must_use]
    pub fn empty_configuration(handler: impl Into<String>) -> Self {
        Self::EmptyConfiguration {
            handler: handler.into(),
        }
    }
}
