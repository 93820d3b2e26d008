//! Frames-in-flight scheduling
//!
//! A fixed ring of [`FrameSlot`]s lets the CPU record and submit frame N+1
//! while the GPU still executes frame N. Each frame:
//!
//! 1. waits on the slot's fence, then forgets any image entries pointing at it
//! 2. acquires an image, rebuilding the swapchain if the surface went stale
//! 3. waits on the fence of whichever slot last used that image, if different
//! 4. prepares the image's command buffer
//! 5. resets the slot's fence and submits
//! 6. presents
//! 7. records the slot's fence against the image
//! 8. advances to the next slot
//!
//! Step 7 happens right after the submit succeeds so that a failed present
//! cannot leave an in-flight image untracked.

use super::backend::{FrameBackend, PresentStatus};
use super::image_fences::ImageFences;
use super::slot::{FrameSlot, SlotState};
use crate::render::vulkan::{ErrorKind, VulkanResult};

/// Recreate-and-retry rounds for one frame before giving up on it
pub const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

/// Outcome of one `draw_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Submitted and queued for presentation
    Presented,
    /// Presented, and the swapchain was rebuilt during the frame
    PresentedAndRecreated,
    /// Nothing was submitted; the surface could not be used this time
    Skipped,
}

/// Drives the per-frame protocol over a fixed ring of slots
#[derive(Debug)]
pub struct FrameScheduler<F, S> {
    slots: Vec<FrameSlot<F, S>>,
    image_fences: ImageFences<F>,
    current: usize,
    timeout_ns: u64,
    recreate_requested: bool,
    frames_presented: u64,
    recreations: u64,
}

impl<F, S> FrameScheduler<F, S>
where
    F: Copy + Eq + std::fmt::Debug,
    S: Copy + std::fmt::Debug,
{
    /// Create a scheduler over `slots`, whose fences must start signaled
    ///
    /// # Panics
    ///
    /// Panics if `slots` is empty.
    pub fn new(slots: Vec<FrameSlot<F, S>>, image_count: usize, timeout_ns: u64) -> Self {
        assert!(!slots.is_empty(), "frame scheduler needs at least one slot");
        Self {
            slots,
            image_fences: ImageFences::new(image_count),
            current: 0,
            timeout_ns,
            recreate_requested: false,
            frames_presented: 0,
            recreations: 0,
        }
    }

    /// Render and present one frame
    pub fn draw_frame<B>(&mut self, backend: &mut B) -> VulkanResult<FrameStatus>
    where
        B: FrameBackend<Fence = F, Semaphore = S>,
    {
        let timeout = self.timeout_ns;
        let slot_index = self.current;
        let slot = self.slots[slot_index];
        let recreations_before = self.recreations;

        backend.wait_for_fence(slot.in_flight, timeout)?;
        self.observe_signaled(slot.in_flight);

        let mut attempts = 0;
        let acquired = loop {
            self.slots[slot_index].state = SlotState::Acquiring;
            match backend.acquire_next_image(slot.image_available, timeout) {
                Ok(acquired) => break acquired,
                Err(err) if err.kind() == ErrorKind::SurfaceInvalidated => {
                    self.slots[slot_index].state = SlotState::Idle;
                    if attempts == MAX_ACQUIRE_ATTEMPTS {
                        log::warn!("Swapchain still stale after {} rebuilds; skipping frame", attempts);
                        return Ok(FrameStatus::Skipped);
                    }
                    attempts += 1;
                    log::debug!("Swapchain out of date during acquire (attempt {})", attempts);
                    if !self.recreate(backend)? {
                        return Ok(FrameStatus::Skipped);
                    }
                }
                Err(err) => {
                    self.slots[slot_index].state = SlotState::Idle;
                    return Err(err);
                }
            }
        };
        let image = acquired.index as usize;
        log::trace!("Slot {} acquired image {}", slot_index, acquired.index);

        if let Some(previous) = self.image_fences.get(image) {
            if previous != slot.in_flight {
                log::trace!("Image {} still in use by {:?}; waiting", acquired.index, previous);
                backend.wait_for_fence(previous, timeout)?;
                self.observe_signaled(previous);
            }
        }

        backend.prepare_commands(acquired.index)?;

        backend.reset_fence(slot.in_flight)?;
        backend.submit(acquired.index, slot.image_available, slot.render_finished, slot.in_flight)?;
        self.slots[slot_index].state = SlotState::Submitted;
        self.image_fences.set(image, slot.in_flight);

        let mut needs_recreate = acquired.suboptimal || self.recreate_requested;
        match backend.present(acquired.index, slot.render_finished) {
            Ok(PresentStatus::Optimal) => {}
            Ok(PresentStatus::Suboptimal) => needs_recreate = true,
            Err(err) if err.kind() == ErrorKind::SurfaceInvalidated => {
                log::debug!("Swapchain out of date during present");
                needs_recreate = true;
            }
            Err(err) => return Err(err),
        }
        self.slots[slot_index].state = SlotState::Presented;
        self.frames_presented += 1;

        self.current = (self.current + 1) % self.slots.len();

        if needs_recreate {
            self.recreate_requested = false;
            self.recreate(backend)?;
        }

        if self.recreations > recreations_before {
            Ok(FrameStatus::PresentedAndRecreated)
        } else {
            Ok(FrameStatus::Presented)
        }
    }

    /// Rebuild the swapchain after the next presented frame
    pub fn request_recreate(&mut self) {
        self.recreate_requested = true;
    }

    /// Drain the device and return every slot to Idle
    pub fn shutdown<B>(&mut self, backend: &mut B) -> VulkanResult<()>
    where
        B: FrameBackend<Fence = F, Semaphore = S>,
    {
        backend.wait_idle()?;
        self.mark_all_idle();
        let image_count = self.image_fences.len();
        self.image_fences.reset(image_count);
        log::debug!("Frame scheduler drained after {} frames", self.frames_presented);
        Ok(())
    }

    /// Slots whose fence may still be pending
    pub fn outstanding_submissions(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state.is_outstanding()).count()
    }

    /// Frames queued for presentation so far
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Swapchain rebuilds so far
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// State of slot `index`
    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(|slot| slot.state)
    }

    /// Slot the next frame will use
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Ring size
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Per-image fence record
    pub fn image_fences(&self) -> &ImageFences<F> {
        &self.image_fences
    }

    fn observe_signaled(&mut self, fence: F) {
        for slot in &mut self.slots {
            if slot.in_flight == fence {
                slot.state = SlotState::Idle;
            }
        }
        self.image_fences.clear_fence(fence);
    }

    fn mark_all_idle(&mut self) {
        for slot in &mut self.slots {
            slot.state = SlotState::Idle;
        }
    }

    fn recreate<B>(&mut self, backend: &mut B) -> VulkanResult<bool>
    where
        B: FrameBackend<Fence = F, Semaphore = S>,
    {
        match backend.recreate_swapchain()? {
            Some(image_count) => {
                // The backend drained the device, so every fence is signaled
                self.mark_all_idle();
                self.image_fences.reset(image_count);
                self.recreations += 1;
                log::debug!("Swapchain rebuilt with {} images", image_count);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::backend::AcquiredImage;
    use crate::render::vulkan::VulkanError;
    use ash::vk;
    use std::collections::{HashMap, VecDeque};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct FenceId(usize);

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct SemaphoreId(usize);

    #[derive(Debug, Clone, Copy)]
    enum Acquire {
        Image(u32),
        Suboptimal(u32),
        OutOfDate,
        Fail(vk::Result),
    }

    #[derive(Debug, Clone, Copy)]
    enum Present {
        Optimal,
        Suboptimal,
        OutOfDate,
    }

    /// GPU model where a submission completes once its fence is waited on
    struct FakeDevice {
        signaled: Vec<bool>,
        // Submissions made on each fence so far
        submissions: Vec<u64>,
        // Fence and submission number of the last work on each image
        image_owner: HashMap<u32, (FenceId, u64)>,
        acquires: VecDeque<Acquire>,
        presents: VecDeque<Present>,
        next_image: u32,
        image_count: usize,
        rebuilt_image_count: Option<usize>,
        stuck_fences: Vec<FenceId>,
        waits: Vec<FenceId>,
        prepared: Vec<u32>,
        max_outstanding: usize,
        violations: Vec<String>,
    }

    impl FakeDevice {
        fn new(fences: usize, image_count: usize) -> Self {
            Self {
                signaled: vec![true; fences],
                submissions: vec![0; fences],
                image_owner: HashMap::new(),
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                next_image: 0,
                image_count,
                rebuilt_image_count: Some(image_count),
                stuck_fences: Vec::new(),
                waits: Vec::new(),
                prepared: Vec::new(),
                max_outstanding: 0,
                violations: Vec::new(),
            }
        }

        fn outstanding(&self) -> usize {
            self.signaled.iter().filter(|signaled| !**signaled).count()
        }

        /// Release the device; every fence must be signaled by now
        fn destroy(&self) -> Result<(), String> {
            match self.outstanding() {
                0 => Ok(()),
                n => Err(format!("{n} fence(s) still pending at destruction")),
            }
        }
    }

    impl FrameBackend for FakeDevice {
        type Fence = FenceId;
        type Semaphore = SemaphoreId;

        fn wait_for_fence(&mut self, fence: FenceId, timeout_ns: u64) -> VulkanResult<()> {
            self.waits.push(fence);
            if !self.signaled[fence.0] && self.stuck_fences.contains(&fence) {
                return Err(VulkanError::SynchronizationTimeout { timeout_ns });
            }
            self.signaled[fence.0] = true;
            Ok(())
        }

        fn reset_fence(&mut self, fence: FenceId) -> VulkanResult<()> {
            if !self.signaled[fence.0] {
                self.violations.push(format!("reset of pending {fence:?}"));
            }
            self.signaled[fence.0] = false;
            Ok(())
        }

        fn acquire_next_image(&mut self, _signal: SemaphoreId, _timeout_ns: u64) -> VulkanResult<AcquiredImage> {
            let next = self.acquires.pop_front().unwrap_or_else(|| {
                let image = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count as u32;
                Acquire::Image(image)
            });
            match next {
                Acquire::Image(index) => Ok(AcquiredImage { index, suboptimal: false }),
                Acquire::Suboptimal(index) => Ok(AcquiredImage { index, suboptimal: true }),
                Acquire::OutOfDate => Err(VulkanError::from_api(vk::Result::ERROR_OUT_OF_DATE_KHR)),
                Acquire::Fail(result) => Err(VulkanError::from_api(result)),
            }
        }

        fn prepare_commands(&mut self, image_index: u32) -> VulkanResult<()> {
            if let Some(&(owner, submission)) = self.image_owner.get(&image_index) {
                // Pending only if that exact submission is the fence's latest one
                let latest = self.submissions[owner.0] == submission + 1;
                if latest && !self.signaled[owner.0] {
                    self.violations
                        .push(format!("image {image_index} reused while {owner:?} pending"));
                }
            }
            self.prepared.push(image_index);
            Ok(())
        }

        fn submit(
            &mut self,
            image_index: u32,
            _wait: SemaphoreId,
            _signal: SemaphoreId,
            fence: FenceId,
        ) -> VulkanResult<()> {
            if self.signaled[fence.0] {
                self.violations.push(format!("submit with signaled {fence:?}"));
            }
            self.image_owner.insert(image_index, (fence, self.submissions[fence.0]));
            self.submissions[fence.0] += 1;
            self.max_outstanding = self.max_outstanding.max(self.outstanding());
            Ok(())
        }

        fn present(&mut self, _image_index: u32, _wait: SemaphoreId) -> VulkanResult<PresentStatus> {
            match self.presents.pop_front().unwrap_or(Present::Optimal) {
                Present::Optimal => Ok(PresentStatus::Optimal),
                Present::Suboptimal => Ok(PresentStatus::Suboptimal),
                Present::OutOfDate => Err(VulkanError::SurfaceInvalidated),
            }
        }

        fn recreate_swapchain(&mut self) -> VulkanResult<Option<usize>> {
            self.wait_idle()?;
            let rebuilt = self.rebuilt_image_count;
            if let Some(count) = rebuilt {
                self.image_count = count;
                self.next_image = 0;
                self.image_owner.clear();
            }
            Ok(rebuilt)
        }

        fn wait_idle(&mut self) -> VulkanResult<()> {
            self.signaled.iter_mut().for_each(|signaled| *signaled = true);
            Ok(())
        }
    }

    fn scheduler(frames_in_flight: usize, image_count: usize) -> FrameScheduler<FenceId, SemaphoreId> {
        crate::foundation::logging::init_for_tests();
        let slots = (0..frames_in_flight)
            .map(|i| FrameSlot::new(SemaphoreId(2 * i), SemaphoreId(2 * i + 1), FenceId(i)))
            .collect();
        FrameScheduler::new(slots, image_count, 1_000_000_000)
    }

    #[test]
    fn test_outstanding_submissions_bounded_by_ring() {
        for frames_in_flight in 1..=3 {
            let mut device = FakeDevice::new(frames_in_flight, 4);
            let mut frames = scheduler(frames_in_flight, 4);

            for _ in 0..20 {
                assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::Presented);
                assert!(frames.outstanding_submissions() <= frames_in_flight);
            }

            assert_eq!(device.max_outstanding, frames_in_flight);
            assert!(device.violations.is_empty(), "{:?}", device.violations);
            assert_eq!(frames.frames_presented(), 20);
        }
    }

    #[test]
    fn test_fence_reused_for_other_image_is_not_a_conflict() {
        // 3 slots over 4 images: slot 0's fence returns to image 0 one frame
        // after being resubmitted for image 3
        let mut device = FakeDevice::new(3, 4);
        let mut frames = scheduler(3, 4);

        for _ in 0..5 {
            frames.draw_frame(&mut device).unwrap();
        }

        assert_eq!(device.prepared, vec![0, 1, 2, 3, 0]);
        assert!(device.violations.is_empty(), "{:?}", device.violations);
    }

    #[test]
    fn test_pending_image_reuse_is_flagged() {
        let mut device = FakeDevice::new(1, 2);
        device.reset_fence(FenceId(0)).unwrap();
        device.submit(0, SemaphoreId(0), SemaphoreId(1), FenceId(0)).unwrap();

        device.prepare_commands(0).unwrap();
        assert_eq!(device.violations, vec!["image 0 reused while FenceId(0) pending".to_string()]);
    }

    #[test]
    fn test_slots_advance_round_robin() {
        let mut device = FakeDevice::new(2, 3);
        let mut frames = scheduler(2, 3);

        assert_eq!(frames.current_slot(), 0);
        frames.draw_frame(&mut device).unwrap();
        assert_eq!(frames.current_slot(), 1);
        assert_eq!(frames.slot_state(0), Some(SlotState::Presented));
        frames.draw_frame(&mut device).unwrap();
        assert_eq!(frames.current_slot(), 0);
        assert_eq!(frames.slot_state(2), None);
    }

    #[test]
    fn test_out_of_order_image_waits_for_previous_fence() {
        let mut device = FakeDevice::new(2, 3);
        device.acquires.extend([Acquire::Image(0), Acquire::Image(1), Acquire::Image(1)]);
        let mut frames = scheduler(2, 3);

        for _ in 0..3 {
            frames.draw_frame(&mut device).unwrap();
        }

        // Third frame: own fence, then the fence slot 1 left on image 1
        assert_eq!(&device.waits[2..], &[FenceId(0), FenceId(1)]);
        assert_eq!(device.prepared, vec![0, 1, 1]);
        assert!(device.violations.is_empty(), "{:?}", device.violations);
        assert_eq!(frames.slot_state(1), Some(SlotState::Idle));
        assert_eq!(frames.image_fences().get(1), Some(FenceId(0)));
        assert_eq!(frames.image_fences().get(0), None);
    }

    #[test]
    fn test_own_fence_not_waited_twice() {
        let mut device = FakeDevice::new(1, 2);
        device.acquires.extend([Acquire::Image(0), Acquire::Image(0)]);
        let mut frames = scheduler(1, 2);

        frames.draw_frame(&mut device).unwrap();
        frames.draw_frame(&mut device).unwrap();

        assert_eq!(device.waits, vec![FenceId(0), FenceId(0)]);
        assert!(device.violations.is_empty(), "{:?}", device.violations);
    }

    #[test]
    fn test_stale_acquire_recreates_and_retries() {
        let mut device = FakeDevice::new(2, 3);
        device.acquires.extend([Acquire::Image(0), Acquire::OutOfDate, Acquire::Image(1)]);
        device.rebuilt_image_count = Some(4);
        let mut frames = scheduler(2, 3);

        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::Presented);
        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::PresentedAndRecreated);

        assert_eq!(frames.recreations(), 1);
        assert_eq!(frames.frames_presented(), 2);
        assert_eq!(frames.image_fences().len(), 4);
        assert_eq!(frames.image_fences().outstanding(), 1);
        assert_eq!(frames.image_fences().get(1), Some(FenceId(1)));
        assert!(device.violations.is_empty(), "{:?}", device.violations);
    }

    #[test]
    fn test_frame_skipped_when_surface_unavailable() {
        let mut device = FakeDevice::new(2, 3);
        device.acquires.push_back(Acquire::OutOfDate);
        device.rebuilt_image_count = None;
        let mut frames = scheduler(2, 3);

        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::Skipped);
        assert_eq!(frames.frames_presented(), 0);
        assert_eq!(frames.current_slot(), 0);
        assert_eq!(frames.slot_state(0), Some(SlotState::Idle));
        assert!(device.prepared.is_empty());
    }

    #[test]
    fn test_repeated_invalidation_is_bounded() {
        let mut device = FakeDevice::new(2, 3);
        device.acquires.extend([Acquire::OutOfDate; 10]);
        let mut frames = scheduler(2, 3);

        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::Skipped);
        assert_eq!(frames.recreations(), u64::from(MAX_ACQUIRE_ATTEMPTS));
        assert_eq!(device.acquires.len(), 10 - (MAX_ACQUIRE_ATTEMPTS as usize + 1));
    }

    #[test]
    fn test_suboptimal_present_recreates_after_presenting() {
        let mut device = FakeDevice::new(2, 3);
        device.presents.push_back(Present::Suboptimal);
        let mut frames = scheduler(2, 3);

        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::PresentedAndRecreated);
        assert_eq!(frames.frames_presented(), 1);
        assert_eq!(frames.recreations(), 1);
        assert_eq!(frames.outstanding_submissions(), 0);
        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::Presented);
    }

    #[test]
    fn test_stale_present_recreates() {
        let mut device = FakeDevice::new(2, 3);
        device.presents.push_back(Present::OutOfDate);
        let mut frames = scheduler(2, 3);

        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::PresentedAndRecreated);
        assert_eq!(frames.frames_presented(), 1);
    }

    #[test]
    fn test_suboptimal_acquire_used_then_recreated() {
        let mut device = FakeDevice::new(2, 3);
        device.acquires.push_back(Acquire::Suboptimal(2));
        let mut frames = scheduler(2, 3);

        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::PresentedAndRecreated);
        assert_eq!(device.prepared, vec![2]);
        assert_eq!(frames.recreations(), 1);
    }

    #[test]
    fn test_resize_request_honoured_once() {
        let mut device = FakeDevice::new(2, 3);
        let mut frames = scheduler(2, 3);

        frames.request_recreate();
        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::PresentedAndRecreated);
        assert_eq!(frames.draw_frame(&mut device).unwrap(), FrameStatus::Presented);
        assert_eq!(frames.recreations(), 1);
    }

    #[test]
    fn test_fence_timeout_propagates() {
        let mut device = FakeDevice::new(2, 3);
        device.stuck_fences.push(FenceId(0));
        let mut frames = scheduler(2, 3);

        frames.draw_frame(&mut device).unwrap();
        frames.draw_frame(&mut device).unwrap();
        let err = frames.draw_frame(&mut device).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SynchronizationTimeout);
        assert!(matches!(err, VulkanError::SynchronizationTimeout { timeout_ns: 1_000_000_000 }));
    }

    #[test]
    fn test_other_acquire_errors_propagate() {
        let mut device = FakeDevice::new(2, 3);
        device.acquires.push_back(Acquire::Fail(vk::Result::ERROR_DEVICE_LOST));
        let mut frames = scheduler(2, 3);

        let err = frames.draw_frame(&mut device).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);
        assert_eq!(frames.slot_state(0), Some(SlotState::Idle));
        assert_eq!(frames.recreations(), 0);
    }

    #[test]
    fn test_shutdown_leaves_no_pending_fences() {
        let mut device = FakeDevice::new(2, 3);
        let mut frames = scheduler(2, 3);
        for _ in 0..5 {
            frames.draw_frame(&mut device).unwrap();
        }

        frames.shutdown(&mut device).unwrap();

        assert_eq!(frames.outstanding_submissions(), 0);
        assert_eq!(frames.image_fences().outstanding(), 0);
        assert!((0..2).all(|i| frames.slot_state(i) == Some(SlotState::Idle)));
        assert!(device.destroy().is_ok());
    }

    #[test]
    fn test_destroy_without_shutdown_detected() {
        let mut device = FakeDevice::new(2, 3);
        let mut frames = scheduler(2, 3);
        for _ in 0..5 {
            frames.draw_frame(&mut device).unwrap();
        }

        assert!(device.destroy().is_err());
    }
}
