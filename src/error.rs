use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sysfs read failed: {path}: {source}")]
    SysfsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("EC access failed: {path}: {source}")]
    EcAccess {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The platform or device is not one this driver handles.
    #[error("no such device")]
    NoDevice,

    /// The sensor type/attribute/channel combination is not exposed.
    #[error("operation not supported")]
    NotSupported,

    #[error("registration failed: {0}")]
    Registration(String),
}

impl Error {
    /// True for outcomes that mean "not mine, skip" rather than a failure.
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Error::NoDevice | Error::NotSupported)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
