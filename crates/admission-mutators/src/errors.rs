use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity cannot be empty")]
    Empty,

    #[error("quantity \"{0}\" is not a valid number")]
    InvalidNumber(String),

    #[error("quantity suffix \"{0}\" is not supported")]
    InvalidSuffix(String),

    #[error("quantity is too large")]
    Overflow,
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("cannot serialize object: {0}")]
    SerializeObject(#[source] serde_json::Error),

    #[error("cannot serialize JSON patch: {0}")]
    SerializePatch(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("admission request has no old object to compare against")]
    MissingOldObject,

    #[error("cannot decode {kind}: {source}")]
    Object {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected object of kind {expected}, got {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: String,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum OversellError {
    #[error("cannot parse \"{0}\" as a number")]
    InvalidMultiplier(String),

    #[error("multiplier {0} must be a finite number greater than zero")]
    OutOfRange(String),

    #[error("node has no CPU capacity")]
    MissingCapacity,

    #[error("invalid CPU capacity: {0}")]
    Capacity(#[source] QuantityError),
}

/// Failures of the envelope layer. None of them reach a mutator.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unsupported Content-Type \"{0}\": application/json required")]
    UnsupportedMediaType(String),

    #[error("request could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unsupported group version kind: {api_version}, Kind={kind}")]
    UnsupportedSchema { api_version: String, kind: String },

    #[error("admission review does not carry a request")]
    MissingRequest,

    #[error("cannot encode admission review: {0}")]
    Encode(#[source] serde_json::Error),
}

impl DispatchError {
    /// HTTP status the server shell answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::UnsupportedMediaType(_) => 415,
            DispatchError::Decode(_)
            | DispatchError::UnsupportedSchema { .. }
            | DispatchError::MissingRequest => 400,
            DispatchError::Encode(_) => 500,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsLookupError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("localip parameter not found in {0} containers")]
    MissingLocalIp(String),

    #[error("{0} has no cluster IP")]
    MissingClusterIp(String),

    #[error("lookup of {0} timed out")]
    Timeout(String),

    #[error("cannot get {resource}: {message}")]
    Api { resource: String, message: String },

    #[error("{0:?} is not a valid IP address")]
    InvalidAddress(String),

    #[error("no Kubernetes client available")]
    NoClient,
}
