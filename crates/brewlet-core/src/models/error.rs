use crate::models::BrewOperation;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    ExecutableNotFound,
    ProcessSpawnFailed,
    NonZeroExit,
    Terminated,
    InvalidInput,
    StorageFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub operation: Option<BrewOperation>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(
        operation: Option<BrewOperation>,
        kind: CoreErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Fills in the operation when the error was raised below the layer that knows it.
    pub fn attribute(mut self, operation: BrewOperation) -> Self {
        self.operation = self.operation.or(Some(operation));
        self
    }
}
