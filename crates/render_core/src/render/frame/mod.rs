//! Frame pacing
//!
//! The scheduler is generic over fence and semaphore handles and talks to the
//! GPU only through [`FrameBackend`], so the protocol can run against a fake
//! device in tests.

pub mod backend;
pub mod image_fences;
pub mod scheduler;
pub mod slot;

pub use backend::{AcquiredImage, FrameBackend, PresentStatus};
pub use image_fences::ImageFences;
pub use scheduler::{FrameScheduler, FrameStatus, MAX_ACQUIRE_ATTEMPTS};
pub use slot::{FrameSlot, SlotState};
