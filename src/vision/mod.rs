//! Vision: frame queue and vision session (spec.md §4.5).

pub mod frame_queue;
pub mod session;

pub use frame_queue::{Frame, FrameQueue};

pub use session::VisionSession;
