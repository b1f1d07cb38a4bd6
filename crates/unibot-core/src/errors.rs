/// Core error type.
///
/// Adapter crates map their specific errors (redis, teloxide, reqwest) into this
/// type so the dispatcher can log failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("session store error: {0}")]
    Store(String),

    #[error("routing table error: {0}")]
    Routing(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
