//! Frame-in-flight slots and slot-indexed resource arenas

use std::ops::{Index, IndexMut};

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// One of the `MAX_FRAMES_IN_FLIGHT` overlapping frame pipelines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameSlot(usize);

impl FrameSlot {
    /// Slot for `index`, wrapped into range
    pub const fn new(index: usize) -> Self {
        Self(index % MAX_FRAMES_IN_FLIGHT)
    }

    /// Raw slot index in `[0, MAX_FRAMES_IN_FLIGHT)`
    pub const fn index(self) -> usize {
        self.0
    }

    /// The slot that follows this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self((self.0 + 1) % MAX_FRAMES_IN_FLIGHT)
    }
}

/// Fixed-size arena holding one `T` per frame slot
#[derive(Debug)]
pub struct PerFrame<T> {
    items: Vec<T>,
}

impl<T> PerFrame<T> {
    /// Build every slot's value with a fallible constructor
    pub fn try_from_fn<E>(mut build: impl FnMut(FrameSlot) -> Result<T, E>) -> Result<Self, E> {
        let mut items = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for index in 0..MAX_FRAMES_IN_FLIGHT {
            items.push(build(FrameSlot(index))?);
        }
        Ok(Self { items })
    }

    /// Build every slot's value
    pub fn from_fn(mut build: impl FnMut(FrameSlot) -> T) -> Self {
        Self {
            items: (0..MAX_FRAMES_IN_FLIGHT).map(|i| build(FrameSlot(i))).collect(),
        }
    }

    /// Always `MAX_FRAMES_IN_FLIGHT`
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Never true; present for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Index<FrameSlot> for PerFrame<T> {
    type Output = T;

    fn index(&self, slot: FrameSlot) -> &T {
        &self.items[slot.0]
    }
}

impl<T> IndexMut<FrameSlot> for PerFrame<T> {
    fn index_mut(&mut self, slot: FrameSlot) -> &mut T {
        &mut self.items[slot.0]
    }
}

/// Bookkeeping for which frame slot last rendered into each swap chain image
///
/// The presentation engine may hand back images out of order, so an image
/// can still be in use by a slot other than the one about to render into it.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    images_in_flight: Vec<Option<FrameSlot>>,
    current: FrameSlot,
}

impl InFlightTracker {
    /// Tracker for a swap chain with `image_count` images, starting at slot 0
    pub fn new(image_count: usize) -> Self {
        Self {
            images_in_flight: vec![None; image_count],
            current: FrameSlot::default(),
        }
    }

    /// Tracker that continues from `slot`, used when a swap chain is replaced
    pub fn starting_at(image_count: usize, slot: FrameSlot) -> Self {
        Self {
            current: slot,
            ..Self::new(image_count)
        }
    }

    /// Slot whose sync primitives the next acquire/submit will use
    pub const fn current_slot(&self) -> FrameSlot {
        self.current
    }

    /// Slot whose guard last covered `image_index`, if any
    pub fn slot_guarding_image(&self, image_index: usize) -> Option<FrameSlot> {
        self.images_in_flight[image_index]
    }

    /// Record the current slot as the owner of `image_index`
    ///
    /// Returns the previous owner, whose guard must be waited on before
    /// the image is rendered into again.
    pub fn claim_image(&mut self, image_index: usize) -> Option<FrameSlot> {
        self.images_in_flight[image_index].replace(self.current)
    }

    /// Move to the next slot; called after every submit attempt
    pub fn advance(&mut self) {
        self.current = self.current.next();
    }

    /// Number of tracked images
    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_alternate_without_skipping() {
        let mut tracker = InFlightTracker::new(3);
        let sequence: Vec<usize> = (0..6)
            .map(|_| {
                let slot = tracker.current_slot().index();
                tracker.advance();
                slot
            })
            .collect();
        assert_eq!(sequence, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_repeated_lookup_sees_same_slot() {
        let tracker = InFlightTracker::new(2);
        assert_eq!(tracker.current_slot(), tracker.current_slot());
    }

    #[test]
    fn test_claim_reports_previous_owner() {
        let mut tracker = InFlightTracker::new(3);

        assert_eq!(tracker.claim_image(2), None);
        tracker.advance();
        assert_eq!(tracker.claim_image(0), None);
        tracker.advance();

        // Slot 0 comes round again and is handed image 0, last owned by slot 1
        assert_eq!(tracker.claim_image(0), Some(FrameSlot::new(1)));
        assert_eq!(tracker.slot_guarding_image(0), Some(FrameSlot::new(0)));
        assert_eq!(tracker.slot_guarding_image(1), None);
    }

    #[test]
    fn test_replacement_tracker_keeps_slot_but_forgets_images() {
        let mut tracker = InFlightTracker::new(2);
        tracker.claim_image(1);
        tracker.advance();

        let replacement = InFlightTracker::starting_at(3, tracker.current_slot());
        assert_eq!(replacement.current_slot().index(), 1);
        assert_eq!(replacement.image_count(), 3);
        assert_eq!(replacement.slot_guarding_image(1), None);
    }

    #[test]
    fn test_per_frame_arena_has_one_entry_per_slot() {
        let arena = PerFrame::from_fn(|slot| slot.index() * 10);
        assert_eq!(arena.len(), MAX_FRAMES_IN_FLIGHT);
        assert_eq!(arena[FrameSlot::new(1)], 10);

        let failed: Result<PerFrame<u32>, &str> =
            PerFrame::try_from_fn(|slot| if slot.index() == 1 { Err("boom") } else { Ok(0) });
        assert_eq!(failed.unwrap_err(), "boom");
    }
}
