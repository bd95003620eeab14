use thiserror::Error;

/// Failures while setting up a transport. Per-frame I/O problems are not errors at this level.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to open raw socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("interface name `{name}` is not valid")]
    InvalidInterfaceName { name: String },

    #[error("unknown network interface `{name}`: {source}")]
    InterfaceIndex {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind raw socket to `{name}`: {source}")]
    Bind {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("raw socket backend is not supported on this platform")]
    Unsupported,
}
