//! Unified error type.

/// The error type returned by tsu's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. Instrumentation
/// never produces one either: a broken APM backend degrades observability,
/// not availability. This type surfaces infrastructure failures only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding to a port or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The server address is not a valid `host:port` pair.
    #[error("invalid socket address `{addr}`")]
    InvalidAddr { addr: String },

    /// A route pattern was rejected by the radix tree.
    #[error("invalid route `{path}`: {source}")]
    InvalidRoute {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}
