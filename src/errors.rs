use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("{0}")]
    IOError(#[from] std::io::Error),
    #[error("bad yaml: {0}")]
    YAMLError(#[from] serde_yaml::Error),
    #[error("bad table: {0}")]
    CSVError(#[from] csv::Error),
    #[error("bad input pattern: {0}")]
    BadPattern(#[from] glob::PatternError),
    #[error("unreadable path: {0}")]
    UnreadablePath(#[from] glob::GlobError),
    #[error("FITS I/O error: {0}")]
    FitsIO(#[from] fitsio::errors::Error),
    #[error("{0}")]
    InvalidFITS(String),
    #[error("invalid SE image info: {0}")]
    InvalidSeInfo(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("array shape mismatch: {0}")]
    Shape(String),
    #[error("fit failed: {0}")]
    Fit(String),
    #[error("index {0} is outside a table of {1} rows")]
    BadIndex(usize, usize),
    #[error("All metacal fits failed!")]
    AllFitsFailed,
    #[error("could not build worker pool: {0}")]
    ThreadPool(String),
}

/// failures reported by a shear-fitting capability
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// the object's geometry is outside what the model can represent; the
    /// object is dropped and the chunk carries on
    #[error("gmix range error: {0}")]
    Range(String),
    #[error("{0}")]
    Fatal(String),
}

impl From<FitError> for SimError {
    fn from(value: FitError) -> Self {
        SimError::Fit(value.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for SimError {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        SimError::ThreadPool(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_errors_keep_their_message() {
        let err: SimError = FitError::Fatal("psf fit diverged".to_string()).into();
        assert_eq!(err.to_string(), "fit failed: psf fit diverged");
        let err: SimError = FitError::Range("T < 0".to_string()).into();
        assert!(err.to_string().contains("gmix range error: T < 0"));
    }

    #[test]
    fn io_errors_convert() {
        let err: SimError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, SimError::IOError(_)));
    }
}
