use http::StatusCode;
use std::io;

/// Failures surfaced by the download pipeline and mapped to HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Resolution(String),

    #[error("{0}")]
    Fetch(String),

    #[error("storage error: {0}")]
    Storage(#[from] io::Error),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Resolution(_) | ServiceError::Fetch(_) | ServiceError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_kind_to_a_status() {
        assert_eq!(
            ServiceError::InvalidRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::Resolution("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Fetch("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let err: ServiceError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "storage error: disk");
    }
}
