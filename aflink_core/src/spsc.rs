//! Lock-free single-producer single-consumer ring buffer.
//!
//! Used for the audio port's input queue: the audio callback is the sole
//! producer, the foreground protocol thread is the sole consumer.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Cache-line padded wrapper to prevent false sharing between producer and
/// consumer cursors.
#[repr(align(64))]
struct CachePadded<T>(T);

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

struct RingInner<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: usize,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for RingInner<T> {}
unsafe impl<T: Send> Sync for RingInner<T> {}

impl<T> RingInner<T> {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(1);
        let mask = capacity - 1;
        let buffer: Vec<UnsafeCell<MaybeUninit<T>>> =
            (0..capacity).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();

        Self {
            buffer: buffer.into_boxed_slice(),
            capacity,
            mask,
            head: CachePadded(AtomicUsize::new(0)),
            tail: CachePadded(AtomicUsize::new(0)),
        }
    }
}

impl<T> Drop for RingInner<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        for i in tail..head {
            let index = i & self.mask;
            unsafe {
                let ptr = (*self.buffer[index].get()).as_mut_ptr();
                std::ptr::drop_in_place(ptr);
            }
        }
    }
}

/// Factory for producer/consumer pairs.
pub struct RingBuffer;

impl RingBuffer {
    /// Create a new ring buffer; capacity is rounded up to the next power of two.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
        let inner = Arc::new(RingInner::new(capacity));
        (Producer { inner: Arc::clone(&inner) }, Consumer { inner })
    }
}

/// Producer handle. `Send` but not `Clone` — only one producer should exist.
pub struct Producer<T> {
    inner: Arc<RingInner<T>>,
}

unsafe impl<T: Send> Send for Producer<T> {}

impl<T> Producer<T> {
    /// Push a value, returning it back if the buffer is full.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let head = self.inner.head.load(Ordering::Relaxed);
        let tail = self.inner.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= self.inner.capacity {
            return Err(value);
        }

        let index = head & self.inner.mask;
        unsafe {
            (*self.inner.buffer[index].get()).write(value);
        }
        self.inner.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        let head = self.inner.head.load(Ordering::Relaxed);
        let tail = self.inner.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.inner.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer handle. `Send` but not `Clone` — only one consumer should exist.
pub struct Consumer<T> {
    inner: Arc<RingInner<T>>,
}

unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Consumer<T> {
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let head = self.inner.head.load(Ordering::Acquire);

        if tail >= head {
            return None;
        }

        let index = tail & self.inner.mask;
        let value = unsafe { (*self.inner.buffer[index].get()).assume_init_read() };
        self.inner.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        let head = self.inner.head.load(Ordering::Relaxed);
        let tail = self.inner.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_preserves_order() {
        let (mut p, mut c) = RingBuffer::new::<i32>(4);
        assert!(p.try_push(1).is_ok());
        assert!(p.try_push(2).is_ok());
        assert_eq!(c.try_pop(), Some(1));
        assert_eq!(c.try_pop(), Some(2));
        assert_eq!(c.try_pop(), None);
    }

    #[test]
    fn capacity_rounds_to_power_of_two() {
        // requested 3 -> rounds to 4, so four pushes should succeed before rejecting
        let (mut p, _c) = RingBuffer::new::<i32>(3);
        for i in 0..4 {
            assert!(p.try_push(i).is_ok());
        }
        assert!(p.try_push(4).is_err());
    }

    #[test]
    fn full_buffer_rejects_push() {
        let (mut p, _c) = RingBuffer::new::<i32>(2);
        assert!(p.try_push(1).is_ok());
        assert!(p.try_push(2).is_ok());
        assert!(p.is_full());
        assert_eq!(p.try_push(3), Err(3));
    }
}
