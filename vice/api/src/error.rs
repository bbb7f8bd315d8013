use thiserror::Error;

pub type Result<T, E = Error> = ::core::result::Result<T, E>;

/// The structural failure kinds of the exposer. The gateway maps each kind
/// onto an HTTP status code; components below the gateway never touch codes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "tried to mount an input file {new_path} at {mount_path} already used by {existing_path}"
    )]
    InputPathCollision {
        mount_path: String,
        existing_path: String,
        new_path: String,
    },

    #[error("{current} analyses are already running, the limit is {max}")]
    QuotaExceeded { current: usize, max: i64 },

    #[error("{kind} {name:?} already exists and belongs to another analysis")]
    NameCollision { kind: &'static str, name: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("user {user} cannot access analysis {analysis_id}")]
    Forbidden { user: String, analysis_id: String },

    #[error("upstream service unavailable: {0}")]
    Upstream(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound(response.message),
            error @ kube::Error::Api(_) => Self::Internal(anyhow::Error::new(error)),
            // anything below the API-status layer means the cluster itself
            // was unreachable
            error => Self::Upstream(anyhow::Error::new(error)),
        }
    }
}
