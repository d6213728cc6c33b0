//! Region-of-interest selection, crop caching and slide-deck reports for folders of
//! reference photographs.

pub mod crop;
pub mod deck;
pub mod error;
pub mod geometry;
pub mod mapper;
pub mod overlay;
pub mod report;
pub mod selection;
pub mod session;
pub mod settings;
pub mod store;

pub use crop::CropCache;
pub use error::{Error, Result};
pub use geometry::{PointF, RectF, Size, SourceRect};
pub use mapper::{compute_transform, DisplayTransform};
pub use report::{CancelToken, FailureReason, GenerationResult, ReportAssembler, ReportProgress};
pub use selection::{SelectionCompleted, SelectionObserver, SelectionState, SelectionTracker};
pub use session::EditingSession;
pub use settings::Settings;
pub use store::{ImageRecord, RecordUpdate, SessionStore};
