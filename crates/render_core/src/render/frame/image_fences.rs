//! Per-image record of the fence that last used each swapchain image

/// Image index to the fence of the slot that last submitted work for it
///
/// A set entry means the submission may still be executing. Entries are
/// cleared once their fence has been observed signaled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFences<F> {
    entries: Vec<Option<F>>,
}

impl<F: Copy + Eq> ImageFences<F> {
    /// All entries unset
    pub fn new(image_count: usize) -> Self {
        Self {
            entries: vec![None; image_count],
        }
    }

    /// Fence recorded for `image`
    pub fn get(&self, image: usize) -> Option<F> {
        self.entries.get(image).copied().flatten()
    }

    /// Record `fence` as the last user of `image`
    pub fn set(&mut self, image: usize, fence: F) {
        if image >= self.entries.len() {
            self.entries.resize(image + 1, None);
        }
        self.entries[image] = Some(fence);
    }

    /// Clear every entry pointing at `fence`
    pub fn clear_fence(&mut self, fence: F) {
        for entry in &mut self.entries {
            if *entry == Some(fence) {
                *entry = None;
            }
        }
    }

    /// Drop all entries and resize for a new swapchain
    pub fn reset(&mut self, image_count: usize) {
        self.entries.clear();
        self.entries.resize(image_count, None);
    }

    /// Number of swapchain images tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No images tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of set entries
    pub fn outstanding(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }
}
