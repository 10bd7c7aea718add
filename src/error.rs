use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    // Host name resolution
    #[error("invalid host name pattern: {0}")]
    InvalidPattern(String),

    #[error("name and id could not be specified at same time (host: {0})")]
    AmbiguousHost(String),

    #[error("neither name nor id is specified (host: {0})")]
    UnresolvedHost(String),

    // Local configuration and files
    #[error("Configuration error: {0}")]
    Config(String),

    // EC2
    #[error("ec2 instance is not found: {0}")]
    InstanceNotFound(String),

    // session-manager-plugin
    #[error(
        "SessionManagerPlugin is not found.\n\
         Please refer to SessionManager Documentation here:\n\
         http://docs.aws.amazon.com/console/systems-manager/session-manager-plugin-not-found"
    )]
    PluginNotFound,

    #[error("session-manager-plugin failed: {0}")]
    Transport(String),

    // Any EC2, Instance Connect or SSM API failure
    #[error("AWS error: {0}")]
    Remote(String),
}

impl ProxyError {
    pub fn remote(err: impl std::fmt::Display) -> Self {
        ProxyError::Remote(err.to_string())
    }

    pub fn config(err: impl std::fmt::Display) -> Self {
        ProxyError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
