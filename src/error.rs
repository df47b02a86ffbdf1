use thiserror::Error;

/// Errors raised at the construction boundary of a [`Variable`](crate::Variable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Tried to build a variable from something that is not an integer or a float.
    #[error("expected an integer or floating-point value, got {type_name} instead")]
    UnsupportedType { type_name: &'static str },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
