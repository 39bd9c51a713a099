//! Surface pool with least-recently-used recycling.
//!
//! ## Surface lifecycle
//!
//! The pool receives the whole surface batch when a stream is configured
//! and gives it back, untouched, at teardown. In between, each handle is in
//! exactly one place:
//!
//! * queued in the [`FreeQueue`] (indirect mapping only),
//! * checked out to the decoder, between `acquire` and `publish`,
//! * held by an output slot, until a later publish retires it.
//!
//! Under indirect mapping `acquire` first pushes the caller's previous
//! surface (the one it is about to stop using) onto the tail of the queue
//! and then pops the head. The push/pop pairing keeps the three sets a
//! partition of the batch. Any break in that accounting (popping an empty
//! queue, releasing a handle twice or one the pool never owned) is reported
//! as a fatal error instead of being papered over.

use std::collections::HashMap;

use tracing::{debug, error};
use vo_common::{SurfaceHandle, VoError};

use crate::policy::Mapping;

// ---------------------------------------------------------------------------
// Free queue
// ---------------------------------------------------------------------------

/// Why a [`FreeQueue::push`] was refused.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PushFault {
    /// The tail slot is still occupied; more releases than surfaces.
    Overflow,
    /// The index is already waiting in the queue.
    AlreadyQueued,
}

/// Bounded FIFO of surface indices, as a ring over a fixed slot array.
///
/// Indices refer to positions in the pool's handle array. The oldest
/// released index is popped first.
#[derive(Clone, Debug)]
pub struct FreeQueue {
    slots: Vec<Option<usize>>,
    queued: Vec<bool>,
    head: usize,
    tail: usize,
    len: usize,
}

impl FreeQueue {
    /// A full queue holding `0..capacity` in ascending order.
    pub fn full(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(Some).collect(),
            queued: vec![true; capacity],
            head: 0,
            tail: 0,
            len: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        self.queued.get(index).copied().unwrap_or(false)
    }

    /// Append `index` at the tail. `index` must be below the capacity.
    pub fn push(&mut self, index: usize) -> Result<(), PushFault> {
        if self.contains(index) {
            return Err(PushFault::AlreadyQueued);
        }
        if self.capacity() == 0 || self.slots[self.tail].is_some() {
            return Err(PushFault::Overflow);
        }

        self.slots[self.tail] = Some(index);
        self.queued[index] = true;
        self.tail = (self.tail + 1) % self.capacity();
        self.len += 1;
        Ok(())
    }

    /// Remove the oldest index. `None` when every surface is in flight.
    pub fn pop(&mut self) -> Option<usize> {
        if self.capacity() == 0 {
            return None;
        }

        let index = self.slots[self.head].take()?;
        self.queued[index] = false;
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(index)
    }

    /// Queued indices, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter_map(move |offset| self.slots[(self.head + offset) % self.capacity()])
    }
}

// ---------------------------------------------------------------------------
// Surface pool
// ---------------------------------------------------------------------------

/// Owns one configuration's surface batch and hands surfaces to the decoder.
#[derive(Debug)]
pub struct SurfacePool {
    surfaces: Vec<SurfaceHandle>,
    positions: HashMap<SurfaceHandle, usize>,
    mapping: Mapping,
    /// Present only under [`Mapping::Indirect`].
    free: Option<FreeQueue>,
    recycled: u64,
}

impl SurfacePool {
    /// Take ownership of a freshly created batch. Under indirect mapping
    /// every surface starts out free, in batch order.
    pub fn new(surfaces: Vec<SurfaceHandle>, mapping: Mapping) -> Self {
        let positions = surfaces
            .iter()
            .enumerate()
            .map(|(index, &handle)| (handle, index))
            .collect();
        let free = match mapping {
            Mapping::Direct => None,
            Mapping::Indirect => Some(FreeQueue::full(surfaces.len())),
        };

        Self {
            surfaces,
            positions,
            mapping,
            free,
            recycled: 0,
        }
    }

    pub fn mapping(&self) -> Mapping {
        self.mapping
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn surfaces(&self) -> &[SurfaceHandle] {
        &self.surfaces
    }

    pub fn contains(&self, handle: SurfaceHandle) -> bool {
        self.positions.contains_key(&handle)
    }

    /// Whether `handle` is waiting in the free-queue. Always false under
    /// direct mapping.
    pub fn is_free(&self, handle: SurfaceHandle) -> bool {
        match (&self.free, self.positions.get(&handle)) {
            (Some(queue), Some(&index)) => queue.contains(index),
            _ => false,
        }
    }

    /// Surfaces waiting in the free-queue, oldest release first. Empty under
    /// direct mapping.
    pub fn free_surfaces(&self) -> Vec<SurfaceHandle> {
        self.free
            .iter()
            .flat_map(|queue| queue.iter())
            .map(|index| self.surfaces[index])
            .collect()
    }

    pub fn free_len(&self) -> usize {
        self.free.as_ref().map_or(0, FreeQueue::len)
    }

    /// Number of surfaces returned through the free-queue so far.
    pub fn recycled(&self) -> u64 {
        self.recycled
    }

    /// Surface for the decoder's next frame.
    ///
    /// * Direct: `surfaces[frame_identity]`; `previous` is ignored.
    /// * Indirect: `previous` (if any) goes to the back of the free-queue,
    ///   then the least recently released surface is returned.
    pub fn acquire(
        &mut self,
        frame_identity: usize,
        previous: Option<SurfaceHandle>,
    ) -> Result<SurfaceHandle, VoError> {
        if self.mapping == Mapping::Direct {
            return self.surfaces.get(frame_identity).copied().ok_or_else(|| {
                error!(
                    identity = frame_identity,
                    surfaces = self.surfaces.len(),
                    "Frame identity outside the direct-mapped pool"
                );
                VoError::OutOfBoundsIdentity {
                    identity: frame_identity,
                    count: self.surfaces.len(),
                }
            });
        }

        if let Some(previous) = previous {
            self.release(previous)?;
        }

        let capacity = self.surfaces.len();
        let index = self
            .free
            .as_mut()
            .and_then(FreeQueue::pop)
            .ok_or_else(|| {
                error!(capacity, "Free surface queue underflow");
                VoError::FreeQueueUnderflow { capacity }
            })?;

        let surface = self.surfaces[index];
        debug!(%surface, free = self.free_len(), "Acquired surface");
        Ok(surface)
    }

    /// Return `handle` to the tail of the free-queue. No-op under direct
    /// mapping, where the caller's numbering already decides reuse.
    pub fn release(&mut self, handle: SurfaceHandle) -> Result<(), VoError> {
        let Some(queue) = self.free.as_mut() else {
            return Ok(());
        };

        let index = *self.positions.get(&handle).ok_or_else(|| {
            error!(%handle, "Released surface does not belong to the pool");
            VoError::ForeignSurface(handle)
        })?;

        queue.push(index).map_err(|fault| {
            error!(%handle, ?fault, "Free surface queue rejected release");
            match fault {
                PushFault::AlreadyQueued => VoError::DoubleRelease(handle),
                PushFault::Overflow => VoError::FreeQueueOverflow(handle),
            }
        })?;

        self.recycled += 1;
        Ok(())
    }

    /// Give the batch back for destruction.
    pub fn into_surfaces(self) -> Vec<SurfaceHandle> {
        self.surfaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles(count: u32) -> Vec<SurfaceHandle> {
        (0..count).map(|i| SurfaceHandle::new(0x100 + i)).collect()
    }

    #[test]
    fn free_queue_starts_full_in_order() {
        let mut queue = FreeQueue::full(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn free_queue_wraps_around() {
        let mut queue = FreeQueue::full(2);
        let a = queue.pop().unwrap();
        queue.push(a).unwrap();
        let b = queue.pop().unwrap();
        queue.push(b).unwrap();
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn free_queue_refuses_duplicates_and_overflow() {
        let mut queue = FreeQueue::full(2);
        assert_eq!(queue.push(1), Err(PushFault::AlreadyQueued));

        let mut zero = FreeQueue::full(0);
        assert_eq!(zero.push(0), Err(PushFault::Overflow));
        assert_eq!(zero.pop(), None);
    }

    #[test]
    fn direct_acquire_is_idempotent() {
        let batch = handles(17);
        let mut pool = SurfacePool::new(batch.clone(), Mapping::Direct);

        assert_eq!(pool.acquire(0, None).unwrap(), batch[0]);
        assert_eq!(pool.acquire(0, Some(batch[5])).unwrap(), batch[0]);
        assert_eq!(pool.acquire(16, None).unwrap(), batch[16]);
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn direct_acquire_out_of_bounds() {
        let mut pool = SurfacePool::new(handles(3), Mapping::Direct);
        let err = pool.acquire(3, None).unwrap_err();
        assert_eq!(err, VoError::OutOfBoundsIdentity { identity: 3, count: 3 });
        assert!(err.is_fatal());
    }

    #[test]
    fn indirect_recycles_in_release_order() {
        let batch = handles(6);
        let mut pool = SurfacePool::new(batch.clone(), Mapping::Indirect);

        let drained: Vec<_> = (0..6).map(|_| pool.acquire(0, None).unwrap()).collect();
        assert_eq!(drained, batch);

        let (a, b, c) = (batch[4], batch[1], batch[3]);
        pool.release(a).unwrap();
        pool.release(b).unwrap();
        pool.release(c).unwrap();

        assert_eq!(pool.acquire(0, None).unwrap(), a);
        assert_eq!(pool.acquire(0, None).unwrap(), b);
        assert_eq!(pool.acquire(0, None).unwrap(), c);
        assert_eq!(pool.recycled(), 3);
    }

    #[test]
    fn indirect_push_then_pop_returns_oldest() {
        let batch = handles(3);
        let mut pool = SurfacePool::new(batch.clone(), Mapping::Indirect);

        let first = pool.acquire(0, None).unwrap();
        // Queue is [1, 2]; releasing `first` appends it behind them.
        let next = pool.acquire(0, Some(first)).unwrap();
        assert_eq!(next, batch[1]);
        assert_eq!(pool.free_surfaces(), vec![batch[2], batch[0]]);
    }

    #[test]
    fn indirect_underflow_is_detected() {
        let mut pool = SurfacePool::new(handles(2), Mapping::Indirect);
        pool.acquire(0, None).unwrap();
        pool.acquire(1, None).unwrap();

        let err = pool.acquire(2, None).unwrap_err();
        assert_eq!(err, VoError::FreeQueueUnderflow { capacity: 2 });
    }

    #[test]
    fn double_and_foreign_release_are_rejected() {
        let batch = handles(3);
        let mut pool = SurfacePool::new(batch.clone(), Mapping::Indirect);

        assert_eq!(pool.release(batch[0]), Err(VoError::DoubleRelease(batch[0])));

        let stranger = SurfaceHandle::new(0xdead);
        assert_eq!(
            pool.acquire(0, Some(stranger)),
            Err(VoError::ForeignSurface(stranger))
        );
        assert_eq!(pool.free_len(), 3);
    }

    #[test]
    fn is_free_follows_the_queue() {
        let batch = handles(3);
        let mut pool = SurfacePool::new(batch.clone(), Mapping::Indirect);
        assert!(pool.is_free(batch[0]));

        let taken = pool.acquire(0, None).unwrap();
        assert!(!pool.is_free(taken));
        pool.release(taken).unwrap();
        assert!(pool.is_free(taken));
        assert!(!pool.is_free(SurfaceHandle::new(0xdead)));

        let direct = SurfacePool::new(batch.clone(), Mapping::Direct);
        assert!(!direct.is_free(batch[0]));
    }

    #[test]
    fn release_is_a_no_op_under_direct_mapping() {
        let batch = handles(3);
        let mut pool = SurfacePool::new(batch.clone(), Mapping::Direct);
        assert!(pool.release(batch[0]).is_ok());
        assert!(pool.free_surfaces().is_empty());
    }

    #[test]
    fn into_surfaces_returns_whole_batch() {
        let batch = handles(4);
        let mut pool = SurfacePool::new(batch.clone(), Mapping::Indirect);
        pool.acquire(0, None).unwrap();
        assert_eq!(pool.into_surfaces(), batch);
    }
}
