//! Frame slots

/// Where a slot is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Its fence has been observed signaled; resources may be reused
    Idle,
    /// Waiting for a swapchain image
    Acquiring,
    /// Work submitted; fence pending
    Submitted,
    /// Queued for presentation; fence may still be pending
    Presented,
}

impl SlotState {
    /// The slot's fence may still be unsignaled
    pub fn is_outstanding(self) -> bool {
        matches!(self, Self::Submitted | Self::Presented)
    }
}

/// Synchronization handles for one frame in flight
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot<F, S> {
    /// Signaled by acquisition
    pub image_available: S,
    /// Signaled when rendering finished
    pub render_finished: S,
    /// Signaled when the slot's submission completed
    pub in_flight: F,
    /// Current cycle state
    pub state: SlotState,
}

impl<F, S> FrameSlot<F, S> {
    /// Slot with a signaled fence, ready for its first frame
    pub fn new(image_available: S, render_finished: S, in_flight: F) -> Self {
        Self {
            image_available,
            render_finished,
            in_flight,
            state: SlotState::Idle,
        }
    }
}
