//! Service layer for image loading and progress reporting

pub mod io;
pub mod progress;

pub use io::{bounded_dimensions, mime_type, ImageLoader};
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
