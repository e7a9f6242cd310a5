use canopy_core::collection::CollectionId;
use canopy_core::engine::{EngineError, MoveError};
use canopy_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Move(#[from] MoveError),

    /// Reads answer "not found" whether the collection is missing or hidden.
    #[error("collection {0} not found")]
    NotFound(CollectionId),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_from_engine_error() {
        let api_err: ApiError = EngineError::StorageError("disk on fire".to_string()).into();

        assert!(
            api_err.to_string().contains("disk on fire"),
            "expected cause in error message, got: {api_err}"
        );
    }

    #[test]
    fn api_error_from_storage_error() {
        let api_err: ApiError = StorageError::NotFound("collection:3".to_string()).into();

        assert!(
            api_err.to_string().contains("collection:3"),
            "expected id in error message, got: {api_err}"
        );
    }

    #[test]
    fn api_error_from_move_error_keeps_message() {
        let api_err: ApiError = MoveError::CircularMove(CollectionId::new(4)).into();

        assert!(
            api_err.to_string().contains("descendants"),
            "expected structural message, got: {api_err}"
        );
    }

    #[test]
    fn api_error_not_found_names_collection() {
        let api_err = ApiError::NotFound(CollectionId::new(12));
        assert_eq!(api_err.to_string(), "collection collection:12 not found");
    }
}
