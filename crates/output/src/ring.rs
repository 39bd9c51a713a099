//! Double-buffered output slots.
//!
//! A decoded surface enters the ring on `publish` and stays there until a
//! later publish lands in the same slot. The displaced surface is returned
//! to the caller as "retired": it is no longer needed for display and may be
//! handed back to the pool on the decoder's next acquire.
//!
//! Two slots guarantee that the surface on screen is never the one the
//! decoder is about to overwrite: by the time a slot is reused, the frame
//! published after it has already been presented.

use vo_common::SurfaceHandle;

/// Number of in-flight display buffers.
pub const OUTPUT_SLOTS: usize = 2;

#[derive(Clone, Debug, Default)]
pub struct OutputSlotRing {
    slots: [Option<SurfaceHandle>; OUTPUT_SLOTS],
    /// Slot the next publish writes.
    cursor: usize,
}

impl OutputSlotRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `surface` in the next slot and return the surface it displaced.
    #[must_use = "the retired surface must be handed back to the pool"]
    pub fn publish(&mut self, surface: SurfaceHandle) -> Option<SurfaceHandle> {
        let retired = self.slots[self.cursor].replace(surface);
        self.cursor = (self.cursor + 1) % OUTPUT_SLOTS;
        retired
    }

    /// Most recently published surface.
    pub fn current(&self) -> Option<SurfaceHandle> {
        self.slots[(self.cursor + OUTPUT_SLOTS - 1) % OUTPUT_SLOTS]
    }

    /// Whether any slot still references `surface`.
    pub fn holds(&self, surface: SurfaceHandle) -> bool {
        self.slots.contains(&Some(surface))
    }

    /// Occupied slots, oldest first.
    pub fn occupied(&self) -> impl Iterator<Item = SurfaceHandle> + '_ {
        (0..OUTPUT_SLOTS).filter_map(move |offset| self.slots[(self.cursor + offset) % OUTPUT_SLOTS])
    }

    /// Empty every slot. Used when the surface batch is destroyed.
    pub fn clear(&mut self) {
        self.slots = [None; OUTPUT_SLOTS];
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(raw: u32) -> SurfaceHandle {
        SurfaceHandle::new(raw)
    }

    #[test]
    fn empty_ring_has_nothing_to_show() {
        let ring = OutputSlotRing::new();
        assert_eq!(ring.current(), None);
        assert_eq!(ring.occupied().count(), 0);
    }

    #[test]
    fn latest_publish_is_current() {
        let mut ring = OutputSlotRing::new();
        assert_eq!(ring.publish(s(1)), None);
        assert_eq!(ring.current(), Some(s(1)));
        assert_eq!(ring.publish(s(2)), None);
        assert_eq!(ring.current(), Some(s(2)));
    }

    #[test]
    fn surface_retires_two_publishes_later() {
        let mut ring = OutputSlotRing::new();
        let _ = ring.publish(s(1));
        let _ = ring.publish(s(2));
        assert_eq!(ring.publish(s(3)), Some(s(1)));
        assert_eq!(ring.publish(s(4)), Some(s(2)));
        assert_eq!(ring.occupied().collect::<Vec<_>>(), vec![s(3), s(4)]);
        assert!(!ring.holds(s(1)));
        assert!(ring.holds(s(4)));
    }

    #[test]
    fn clear_resets_cursor() {
        let mut ring = OutputSlotRing::new();
        let _ = ring.publish(s(1));
        ring.clear();
        assert_eq!(ring.current(), None);
        assert_eq!(ring.publish(s(2)), None);
        assert_eq!(ring.current(), Some(s(2)));
    }
}
