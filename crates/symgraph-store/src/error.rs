use std::path::PathBuf;

/// Errors produced by table persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("table file {path} exceeds payload limit ({len} bytes)")]
    PayloadTooLarge { path: PathBuf, len: u64 },

    #[error("incompatible table version in {path}: expected {expected}, found {found}")]
    IncompatibleVersion {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("table path {path} has no parent directory")]
    NoParent { path: PathBuf },
}
