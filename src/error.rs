#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Strict Mode Error: {0}")]
    StrictTransform(String),
    #[error("Snapshot for shipment {code_gen} does not match its recorded digest")]
    CorruptSnapshot { code_gen: String },
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CBOR encoding error: {0}")]
    Encoding(String),
}

impl ArchiveError {
    /// Status label recorded by audit events and used by a routing layer
    pub fn http_status(&self) -> &'static str {
        match self {
            ArchiveError::NotFound(_) => "404",
            ArchiveError::Conflict(_) => "409",
            ArchiveError::Validation(_) => "422",
            _ => "400",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ArchiveError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ArchiveError::Conflict(_))
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for ArchiveError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        ArchiveError::Encoding(value.to_string())
    }
}

impl From<minicbor::decode::Error> for ArchiveError {
    fn from(value: minicbor::decode::Error) -> Self {
        ArchiveError::Encoding(value.to_string())
    }
}

/// Status label for an arbitrary service error, falling back to the generic failure label
pub fn status_label(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<ArchiveError>()
        .map(ArchiveError::http_status)
        .unwrap_or("400")
}
