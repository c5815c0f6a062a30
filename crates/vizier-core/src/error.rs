pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed XML in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("Missing package part: {part}")]
    MissingPart { part: String },

    #[error("Classifier error: {message}")]
    Classifier { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn xml(part: &str, err: roxmltree::Error) -> Self {
        Error::Xml {
            part: part.to_string(),
            message: err.to_string(),
        }
    }
}
