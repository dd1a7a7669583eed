use std::sync::Arc;
use std::sync::atomic::{AtomicI16, AtomicUsize, Ordering};

/// Single-producer / single-consumer ring buffer of mono i16 samples.
///
/// The emulator thread produces one frame's worth of samples at a time; an
/// audio callback thread consumes them without locks.
///
/// When full, a push discards the *oldest* sample so the stream stays close
/// to real time. `head` and `tail` are monotonic sample counters; the slot
/// index is the counter masked by the power-of-two capacity.
#[derive(Clone)]
pub struct AudioConsumer {
    inner: Arc<Inner>,
}

pub struct AudioProducer {
    inner: Arc<Inner>,
}

struct Inner {
    buf: Box<[AtomicI16]>,
    mask: usize,
    /// Samples ever pushed.
    head: AtomicUsize,
    /// Samples ever consumed or discarded.
    tail: AtomicUsize,
}

impl Inner {
    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(self.buf.len())
    }
}

/// Build a queue holding at least `capacity` samples (rounded up to a power
/// of two).
pub fn audio_queue(capacity: usize) -> (AudioProducer, AudioConsumer) {
    let cap = capacity.max(2).next_power_of_two();
    let buf: Vec<AtomicI16> = (0..cap).map(|_| AtomicI16::new(0)).collect();
    let inner = Arc::new(Inner {
        buf: buf.into_boxed_slice(),
        mask: cap - 1,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });
    (
        AudioProducer {
            inner: Arc::clone(&inner),
        },
        AudioConsumer { inner },
    )
}

impl AudioProducer {
    /// Append one sample. Returns `false` if the oldest sample had to be
    /// discarded to make room.
    #[inline]
    pub fn push(&self, sample: i16) -> bool {
        let inner = &*self.inner;
        let head = inner.head.load(Ordering::Relaxed);
        let tail = inner.tail.load(Ordering::Acquire);
        let mut kept = true;
        if head.wrapping_sub(tail) > inner.mask {
            // A failed exchange means the consumer just freed the slot.
            kept = inner
                .tail
                .compare_exchange(tail, tail.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
                .is_err();
        }
        inner.buf[head & inner.mask].store(sample, Ordering::Relaxed);
        inner.head.store(head.wrapping_add(1), Ordering::Release);
        kept
    }

    /// Drop everything not yet consumed.
    pub fn clear(&self) {
        let head = self.inner.head.load(Ordering::Relaxed);
        self.inner.tail.store(head, Ordering::Release);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.buf.len()
    }
}

impl AudioConsumer {
    #[inline]
    pub fn pop(&self) -> Option<i16> {
        let inner = &*self.inner;
        loop {
            let tail = inner.tail.load(Ordering::Acquire);
            let head = inner.head.load(Ordering::Acquire);
            if tail == head {
                return None;
            }
            let sample = inner.buf[tail & inner.mask].load(Ordering::Relaxed);
            // Losing the exchange means the producer discarded this sample
            // (and may have overwritten the slot); read the new oldest.
            if inner
                .tail
                .compare_exchange(tail, tail.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(sample);
            }
        }
    }

    /// Fill `out` with queued samples, padding with silence on underrun.
    /// Returns how many real samples were copied.
    pub fn drain_into(&self, out: &mut [i16]) -> usize {
        let mut n = 0;
        for slot in out.iter_mut() {
            match self.pop() {
                Some(s) => {
                    *slot = s;
                    n += 1;
                }
                None => *slot = 0,
            }
        }
        n
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let (tx, rx) = audio_queue(8);
        for s in 1..=5 {
            assert!(tx.push(s));
        }
        assert_eq!(rx.len(), 5);
        assert_eq!((1..=5).map(|_| rx.pop().unwrap()).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(rx.pop().is_none());
    }

    #[test]
    fn overrun_drops_oldest() {
        let (tx, rx) = audio_queue(4);
        for s in 0..4 {
            assert!(tx.push(s));
        }
        assert!(!tx.push(4));
        assert!(!tx.push(5));
        assert_eq!(rx.len(), 4);
        let mut out = [0i16; 4];
        assert_eq!(rx.drain_into(&mut out), 4);
        assert_eq!(out, [2, 3, 4, 5]);
    }

    #[test]
    fn underrun_pads_with_silence() {
        let (tx, rx) = audio_queue(4);
        tx.push(7);
        tx.push(-7);
        let mut out = [99i16; 5];
        assert_eq!(rx.drain_into(&mut out), 2);
        assert_eq!(out, [7, -7, 0, 0, 0]);
    }

    #[test]
    fn capacity_rounds_to_power_of_two() {
        let (tx, rx) = audio_queue(5);
        assert_eq!(tx.capacity(), 8);
        assert_eq!(rx.capacity(), 8);
    }

    #[test]
    fn clear_empties_queue() {
        let (tx, rx) = audio_queue(4);
        tx.push(1);
        tx.clear();
        assert!(rx.is_empty());
        assert!(tx.push(2));
        assert_eq!(rx.pop(), Some(2));
    }

    #[test]
    fn concurrent_consumer_sees_increasing_samples() {
        use std::sync::Barrier;
        use std::thread;

        const LAST: i16 = 30_000;
        const BURST: i16 = 128;
        let (tx, rx) = audio_queue(64);
        let capacity = rx.capacity();
        let start = Arc::new(Barrier::new(2));

        let reader = {
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let mut last = -1i32;
                let mut popped = 0usize;
                loop {
                    match rx.pop() {
                        Some(s) => {
                            assert!(s as i32 > last, "{s} after {last}");
                            last = s as i32;
                            popped += 1;
                            if s == LAST {
                                return popped;
                            }
                        }
                        None => thread::yield_now(),
                    }
                }
            })
        };

        start.wait();
        let mut dropped = 0usize;
        for s in 0..=LAST {
            if !tx.push(s) {
                dropped += 1;
            }
            // Bursts longer than the ring keep it overflowing while the
            // reader is active.
            if s % BURST == 0 {
                thread::yield_now();
            }
        }
        let popped = reader.join().unwrap();
        assert!(popped > 2 * capacity, "only {popped} samples popped");
        // Every tail advance is either a pop or a discard, never both.
        assert_eq!(popped + dropped, LAST as usize + 1);
    }
}
