use std::path::PathBuf;

/// Errors raised while decoding dataset archives and manifests.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("unknown pickle op-code {0:#04x}")]
    UnknownOpCode(u8),

    #[error("pickle: {0}")]
    Pickle(String),

    #[error("expected {expected}, got {got}")]
    UnexpectedObject { expected: &'static str, got: String },

    #[error("missing key '{0}'")]
    MissingKey(String),

    #[error("unsupported array dtype '{0}'")]
    UnsupportedDType(String),

    #[error("buffer of {buffer_size} bytes does not match shape {shape:?}")]
    ShapeMismatch {
        buffer_size: usize,
        shape: Vec<usize>,
    },

    #[error("batch field lengths disagree: data={data}, filenames={filenames}, labels={labels}")]
    LengthMismatch {
        data: usize,
        filenames: usize,
        labels: usize,
    },

    #[error("{path}: line {line}: {msg}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        msg: String,
    },

    #[error("unknown class name '{0}'")]
    UnknownClass(String),

    #[error("no label for image '{0}'")]
    MissingLabel(String),

    #[error("'{0}' is not a plain file name")]
    InvalidFileName(String),

    #[error("'{name}' appears {count} times in {path}")]
    RepeatedRow {
        path: PathBuf,
        name: String,
        count: usize,
    },

    #[error("{0}")]
    Verify(String),
}

pub type Result<T> = std::result::Result<T, Error>;

