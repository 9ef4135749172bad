use thiserror::Error;

/// Problems with document data or page addressing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Invalid page key: {0}")]
    InvalidPageKey(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Failed to parse document: {0}")]
    Parse(String),

    #[error("No document loaded")]
    NotLoaded,

    #[error("Failed to fetch document: {0}")]
    Fetch(#[from] StoreError),
}

impl From<serde_json::Error> for DocumentError {
    fn from(err: serde_json::Error) -> Self {
        DocumentError::Parse(err.to_string())
    }
}

/// Fatal failures of a single render attempt.
///
/// A superseded render is not an error; see [`crate::render::RenderOutcome`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Invalid page number: {page} (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("No document loaded")]
    NoDocument,

    #[error("Invalid render target: {0}")]
    InvalidTarget(String),

    #[error("Raster failed: {0}")]
    Raster(String),

    /// Reported by raster sources that noticed their cancel token. The
    /// render surface turns it into a discarded outcome.
    #[error("Render cancelled")]
    Cancelled,

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Errors reported by collaborator stores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Rejections of a suggestion or vote. Everything except `Store` is raised
/// before any store call is made.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("Sign in to suggest corrections or vote")]
    NotSignedIn,

    #[error("Suggestion text is empty")]
    EmptySuggestion,

    #[error("Suggestion is identical to the current transcription")]
    UnchangedTranscription,

    #[error("Invalid vote value: {0}")]
    InvalidVote(i32),

    #[error("Unknown line: {0}")]
    UnknownLine(String),

    #[error("No page selected")]
    NoPage,

    #[error(transparent)]
    Store(#[from] StoreError),
}
