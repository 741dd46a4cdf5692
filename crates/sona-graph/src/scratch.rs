//! Per-thread scratch buffer pool ("Scratch buffers are rented
//! from a per-thread pool keyed by power-of-two capacity; release on all
//! exit paths... is guaranteed by the component harness"). Renting never
//! allocates once the pool has seen a given capacity before; the returned
//! guard's `Drop` is the release path, so early returns and panics inside
//! a render call still give the buffer back.

use std::cell::RefCell;

use sona_core::Sample;

struct Pool {
    /// Free lists keyed by power-of-two capacity; index `i` holds buffers
    /// of capacity `2^i`.
    free_lists: Vec<Vec<Vec<Sample>>>,
}

impl Pool {
    fn new() -> Self {
        Self {
            free_lists: Vec::new(),
        }
    }

    fn bucket_for(capacity: usize) -> u32 {
        capacity.max(1).next_power_of_two().trailing_zeros()
    }

    fn take(&mut self, len: usize) -> Vec<Sample> {
        let bucket = Self::bucket_for(len) as usize;
        if self.free_lists.len() <= bucket {
            self.free_lists.resize_with(bucket + 1, Vec::new);
        }
        let capacity = 1usize << bucket;
        match self.free_lists[bucket].pop() {
            Some(mut buffer) => {
                buffer.resize(len, 0.0);
                buffer
            }
            None => vec![0.0; capacity.max(len)],
        }
    }

    fn give_back(&mut self, buffer: Vec<Sample>) {
        let bucket = Self::bucket_for(buffer.capacity()) as usize;
        if self.free_lists.len() <= bucket {
            self.free_lists.resize_with(bucket + 1, Vec::new);
        }
        self.free_lists[bucket].push(buffer);
    }
}

thread_local! {
    static POOL: RefCell<Pool> = RefCell::new(Pool::new());
}

/// An RAII-owned scratch buffer of exactly `len` samples; released back
/// to the thread-local pool on drop.
pub struct ScratchBuffer {
    buffer: Vec<Sample>,
}

impl ScratchBuffer {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl std::ops::Deref for ScratchBuffer {
    type Target = [Sample];
    fn deref(&self) -> &[Sample] {
        &self.buffer
    }
}

impl std::ops::DerefMut for ScratchBuffer {
    fn deref_mut(&mut self) -> &mut [Sample] {
        &mut self.buffer
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        POOL.with(|pool| pool.borrow_mut().give_back(buffer));
    }
}

/// Rent a zero-filled scratch buffer of `len` samples from this thread's
/// pool.
pub fn rent(len: usize) -> ScratchBuffer {
    let buffer = POOL.with(|pool| pool.borrow_mut().take(len));
    ScratchBuffer { buffer }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rented_buffer_is_zeroed_and_sized() {
        let buffer = rent(128);
        assert_eq!(buffer.len(), 128);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn dropped_buffer_is_reused() {
        {
            let mut buffer = rent(256);
            buffer[0] = 1.0;
        }
        let buffer = rent(256);
        // reused capacity is zeroed again on take
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn bucket_for_rounds_up_to_power_of_two() {
        assert_eq!(Pool::bucket_for(1), 0);
        assert_eq!(Pool::bucket_for(3), 2);
        assert_eq!(Pool::bucket_for(256), 8);
        assert_eq!(Pool::bucket_for(257), 9);
    }
}
