use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pushnode_shared::error::{EnvelopeError, IdentityError, TokenError};
use pushnode_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid token")]
    InvalidToken,

    #[error("invalid user")]
    InvalidUser,

    #[error("invalid user id")]
    InvalidUserId,

    #[error("invalid device id")]
    InvalidDeviceId,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("registration limited")]
    SystemLimited,

    #[error("no content")]
    NoContent,

    #[error("content too large")]
    TooLargeContent,

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for RelayError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken | TokenError::Expired => Self::InvalidToken,
            TokenError::InvalidUser => Self::InvalidUser,
        }
    }
}

impl From<IdentityError> for RelayError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidPublicKey | IdentityError::InvalidUserId => Self::InvalidUserId,
            IdentityError::InvalidDeviceId => Self::InvalidDeviceId,
        }
    }
}

impl From<EnvelopeError> for RelayError {
    fn from(err: EnvelopeError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidToken | Self::InvalidUser | Self::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            Self::InvalidUserId | Self::InvalidDeviceId | Self::NoContent | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::SystemLimited => StatusCode::NOT_ACCEPTABLE,
            Self::TooLargeContent => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Store(e) => {
                tracing::error!(error = %e, "store failure");
                "storage error".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "res": status.as_u16(),
            "msg": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_errors_collapse() {
        assert!(matches!(
            RelayError::from(TokenError::Expired),
            RelayError::InvalidToken
        ));
        assert!(matches!(
            RelayError::from(TokenError::InvalidUser),
            RelayError::InvalidUser
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(RelayError::TooLargeContent.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(RelayError::SystemLimited.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(RelayError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(RelayError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            RelayError::Store(StoreError::NotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let response = RelayError::Internal("db path /secret".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
