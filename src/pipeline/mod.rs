pub mod directory;
pub mod flatten;
pub mod detect;
pub mod report;

pub use directory::{normalize_session, Directory, DirectoryEntry, NormalizeSummary};
pub use flatten::{flatten_session, FlattenSummary, FlattenedFrame, FrameTable};
pub use detect::{run_detection, run_session, EvilTwinDetector, DetectionSettings};
pub use report::{Detection, EvilTwinReport, NetworkEntry};
