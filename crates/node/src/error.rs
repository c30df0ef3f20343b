use thiserror::Error;

use crate::definition::DefinitionId;

/// Error from registering or looking up a [`crate::NodeDefinition`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a definition with id {0} is already registered")]
    AlreadyExists(DefinitionId),

    #[error("no definition registered with id {0}")]
    NotFound(DefinitionId),

    #[error("invalid category: {0}")]
    InvalidCategory(#[from] nebula_core::KeyParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_mentions_the_missing_id() {
        let id = DefinitionId::nil();
        let err = RegistryError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
