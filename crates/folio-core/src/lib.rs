//! Scan/transcript synchronization for digitized documents
//!
//! This crate links a rendered page scan to its line-by-line transcription:
//! - `geometry` / `index`: normalize OCR line boxes and hit-test pointer positions
//! - `sync`: bidirectional highlight between the page and the transcript
//! - `render`: cancellable page rasterization with scroll preservation
//! - `suggestions` / `submit`: community corrections, ranking and the leaderboard
//!
//! [`ViewerSession`] ties these together behind the collaborator traits in
//! [`store`].

pub mod config;
pub mod coords;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod index;
pub mod model;
pub mod render;
pub mod scroll;
pub mod session;
pub mod store;
pub mod submit;
pub mod suggestions;
pub mod sync;

pub use config::ViewerConfig;
pub use error::{DocumentError, RenderError, StoreError, SubmitError};
pub use geometry::{normalize_box, normalize_page, GeometryLimits, NormalizedBox, Rejection};
pub use index::RegionIndex;
pub use model::{Document, LineUid, Page, PageKey, RawBox};
pub use render::{RasterSource, RenderOutcome, RenderSurface};
pub use session::ViewerSession;
pub use suggestions::{leaderboard, LeaderboardRow, SortMode, Suggestion, Vote, VoteBook};
pub use sync::{Effect, HighlightSource, HighlightState, HighlightSync};
