/// Errors raised while configuring or using the port pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid port range [{first}, {last}]: {reason}")]
    InvalidRange { first: u16, last: u16, reason: String },

    /// No free even port left for the requested label.
    #[error(
        "cannot find free port for '{label}' of stage '{stage}' in range [{first}, {last}]"
    )]
    Exhausted {
        stage: String,
        label: String,
        first: u16,
        last: u16,
    },

    #[error("port {port} is outside the pool range [{first}, {last}]")]
    OutOfRange { port: u16, first: u16, last: u16 },

    #[error("even port expected: {port}")]
    OddPort { port: u16 },

    /// Fixed port already assigned to another stage.
    #[error("port {port} already reserved by stage '{stage}' for '{label}'")]
    Reserved {
        port: u16,
        stage: String,
        label: String,
    },

    /// Fixed port cannot be bound on this host.
    #[error("port already in use: {port}")]
    Busy { port: u16 },
}
