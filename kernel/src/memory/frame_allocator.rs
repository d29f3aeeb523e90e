use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use spin::Mutex;

use super::MemoryError;

/// Allocation bitmap for the frame pool
struct FrameBitmap {
    /// One bit per frame, set when the frame is in use
    words: Vec<u64>,
    frame_count: usize,
    free: usize,
}

impl FrameBitmap {
    fn new(frame_count: usize) -> Self {
        FrameBitmap {
            words: vec![0; frame_count.div_ceil(64)],
            frame_count,
            free: frame_count,
        }
    }

    fn test(&self, n: usize) -> bool {
        self.words[n / 64] & (1 << (n % 64)) != 0
    }

    /// Find and mark the lowest clear bit
    fn find(&mut self) -> Option<usize> {
        let n = (0..self.frame_count).find(|&n| !self.test(n))?;
        self.words[n / 64] |= 1 << (n % 64);
        self.free -= 1;
        Some(n)
    }

    fn clear(&mut self, n: usize) -> bool {
        if n >= self.frame_count || !self.test(n) {
            return false;
        }
        self.words[n / 64] &= !(1 << (n % 64));
        self.free += 1;
        true
    }
}

/// A fixed pool of physical page frames
///
/// Frames come out of the pool as owned [`Frame`] values and go back in when
/// they are dropped. Multi-frame requests are all-or-nothing.
pub struct FramePool {
    bitmap: Mutex<FrameBitmap>,
    frame_size: usize,
}

impl FramePool {
    /// Create a pool of `frame_count` frames of `frame_size` bytes
    pub fn new(frame_count: usize, frame_size: usize) -> Arc<Self> {
        log::debug!(
            "FramePool: {} frames of {} bytes ({} bytes total)",
            frame_count,
            frame_size,
            frame_count * frame_size
        );
        Arc::new(FramePool {
            bitmap: Mutex::new(FrameBitmap::new(frame_count)),
            frame_size,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn total_frames(&self) -> usize {
        self.bitmap.lock().frame_count
    }

    pub fn free_frames(&self) -> usize {
        self.bitmap.lock().free
    }

    /// Allocate a single zeroed frame
    pub fn allocate(self: &Arc<Self>) -> Result<Frame, MemoryError> {
        let mut frames = self.allocate_many(1)?;
        // allocate_many(1) returns exactly one frame on success
        frames.pop().ok_or(MemoryError::OutOfFrames { requested: 1, available: 0 })
    }

    /// Allocate `count` zeroed frames, or none at all
    pub fn allocate_many(self: &Arc<Self>, count: usize) -> Result<Vec<Frame>, MemoryError> {
        let numbers = {
            let mut bitmap = self.bitmap.lock();
            if bitmap.free < count {
                log::debug!(
                    "FramePool: cannot allocate {} frames, only {} free",
                    count,
                    bitmap.free
                );
                return Err(MemoryError::OutOfFrames {
                    requested: count,
                    available: bitmap.free,
                });
            }
            let mut numbers = Vec::with_capacity(count);
            for _ in 0..count {
                // free >= count was checked above while holding the lock
                match bitmap.find() {
                    Some(n) => numbers.push(n),
                    None => break,
                }
            }
            numbers
        };

        Ok(numbers
            .into_iter()
            .map(|number| Frame {
                number,
                data: vec![0u8; self.frame_size].into_boxed_slice(),
                pool: Arc::clone(self),
            })
            .collect())
    }

    fn release(&self, number: usize) {
        if !self.bitmap.lock().clear(number) {
            log::error!("FramePool: frame {} released twice", number);
            panic!("double free of physical frame {}", number);
        }
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bitmap = self.bitmap.lock();
        f.debug_struct("FramePool")
            .field("frame_size", &self.frame_size)
            .field("frames", &bitmap.frame_count)
            .field("free", &bitmap.free)
            .finish()
    }
}

/// One physical frame, owned by exactly one address space
pub struct Frame {
    number: usize,
    data: Box<[u8]>,
    pool: Arc<FramePool>,
}

impl Frame {
    /// Physical frame number
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.pool.release(self.number);
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Frame").field("number", &self.number).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_return_to_pool_on_drop() {
        let pool = FramePool::new(4, 16);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!((a.number(), b.number()), (0, 1));
        assert_eq!(pool.free_frames(), 2);

        drop(a);
        assert_eq!(pool.free_frames(), 3);

        // First-fit reuses the lowest released frame
        let c = pool.allocate().unwrap();
        assert_eq!(c.number(), 0);
        assert!(c.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn allocate_many_is_all_or_nothing() {
        let pool = FramePool::new(3, 8);
        let held = pool.allocate().unwrap();

        let err = pool.allocate_many(3).unwrap_err();
        assert_eq!(err, MemoryError::OutOfFrames { requested: 3, available: 2 });
        assert_eq!(pool.free_frames(), 2);

        let rest = pool.allocate_many(2).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(pool.free_frames(), 0);
        drop(held);
        drop(rest);
        assert_eq!(pool.free_frames(), 3);
    }

    #[test]
    fn bitmap_spans_multiple_words() {
        let pool = FramePool::new(130, 1);
        let frames = pool.allocate_many(130).unwrap();
        assert_eq!(frames.last().map(Frame::number), Some(129));
        assert!(pool.allocate().is_err());
    }
}
