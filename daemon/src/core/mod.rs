//! The analysis pipeline: pure, transport-free logic over I/O image
//! timelines. Everything here is synchronous and deterministic; the async
//! plumbing that feeds it samples lives in `s7` and `registry`.

pub mod cycle;
pub mod histogram;
pub mod image;
pub mod registry;
pub mod session;
pub mod state;
pub mod timeline;
pub mod transition;

pub use image::{Image, Mask, IMAGE_SIZE};
pub use registry::Registry;
pub use session::{Phase, Session, SessionTunables};
pub use timeline::Sample;
