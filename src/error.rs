use thiserror::Error;

// Tagged with the HTTP status and short plain-text body the client sees.
#[derive(Debug, Error)]
pub enum OffloadError {
    #[error("bad request")]
    BadRequest(&'static str),

    #[error("protected content")]
    Forbidden(&'static str),

    #[error("not found")]
    NotFound,

    #[error("origin redirect")]
    Redirect { status: u16, location: Option<String> },

    #[error("origin error")]
    ServiceUnavailable(&'static str),

    #[error("internal error")]
    Internal(&'static str),
}

impl OffloadError {
    pub fn status(&self) -> u16 {
        match self {
            OffloadError::BadRequest(_) => 400,
            OffloadError::Forbidden(_) => 403,
            OffloadError::NotFound => 404,
            OffloadError::Redirect { status, .. } => *status,
            OffloadError::ServiceUnavailable(_) => 503,
            OffloadError::Internal(_) => 500,
        }
    }

    pub fn message(&self) -> String {
        match self {
            OffloadError::BadRequest(m) => m.to_string(),
            OffloadError::Forbidden(m) => m.to_string(),
            OffloadError::NotFound => "Not found".to_string(),
            OffloadError::Redirect { .. } => "Redirect".to_string(),
            OffloadError::ServiceUnavailable(m) => m.to_string(),
            OffloadError::Internal(m) => m.to_string(),
        }
    }
}

impl From<std::io::Error> for OffloadError {
    fn from(e: std::io::Error) -> Self {
        tracing::error!(error = %e, "i/o error");
        OffloadError::Internal("internal error")
    }
}
