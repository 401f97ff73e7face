use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("fetch cdktf version from registry: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid registry url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("registry returned HTTP {status} for cdktf {version}")]
    Status { status: u16, version: String },

    #[error("decode cdktf version response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("jsii version not found")]
    MissingJsii,

    #[error("jsii-pacmak version not found")]
    MissingJsiiPacmak,

    #[error("constructs version not found")]
    MissingConstructs,
}
