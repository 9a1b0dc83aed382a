//! Event queue between producers and a single device worker
//!
//! Unbounded FIFO: producers never block, the worker waits with a timeout.
//! No reordering happens here; the worker alone decides what is stale.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Why [`EventConsumer::pop`] returned without an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Nothing arrived within the timeout
    Timeout,
    /// Every producer is gone
    Disconnected,
}

/// Producer side, cloneable
#[derive(Debug)]
pub struct EventQueue<E> {
    tx: Sender<E>,
    // Held only to discard queued events on drain()
    rx: Receiver<E>,
}

impl<E> Clone for EventQueue<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

/// Consumer side; there is exactly one per queue
#[derive(Debug)]
pub struct EventConsumer<E> {
    rx: Receiver<E>,
}

/// Create a queue and its single consumer
pub fn event_queue<E>() -> (EventQueue<E>, EventConsumer<E>) {
    let (tx, rx) = channel::unbounded();
    (
        EventQueue {
            tx,
            rx: rx.clone(),
        },
        EventConsumer { rx },
    )
}

impl<E> EventQueue<E> {
    /// Enqueue an event without blocking
    ///
    /// Cannot fail while the queue itself holds a receiver, which it always
    /// does; the event is dropped silently only if that ever changes.
    pub fn push(&self, event: E) {
        let _ = self.tx.send(event);
    }

    /// Discard every queued event, returning how many were dropped
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Number of events waiting
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<E> EventConsumer<E> {
    /// Wait up to `timeout` for the next event
    pub fn pop(&self, timeout: Duration) -> Result<E, PopError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => PopError::Timeout,
            RecvTimeoutError::Disconnected => PopError::Disconnected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_fifo_order() {
        let (queue, consumer) = event_queue();
        for i in 0..5 {
            queue.push(i);
        }
        let popped: Vec<i32> = (0..5)
            .map(|_| consumer.pop(Duration::from_millis(10)).unwrap())
            .collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_pop_times_out() {
        let (_queue, consumer) = event_queue::<u8>();
        let start = Instant::now();
        assert_eq!(
            consumer.pop(Duration::from_millis(30)),
            Err(PopError::Timeout)
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_drain_discards_everything_queued() {
        let (queue, consumer) = event_queue();
        queue.push("a");
        queue.push("b");
        queue.push("c");
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.drain(), 3);
        assert!(queue.is_empty());
        assert_eq!(
            consumer.pop(Duration::from_millis(10)),
            Err(PopError::Timeout)
        );

        queue.push("d");
        assert_eq!(consumer.pop(Duration::from_millis(10)), Ok("d"));
    }

    #[test]
    fn test_disconnected_when_producers_gone() {
        let (queue, consumer) = event_queue();
        queue.push(1u8);
        drop(queue);

        // Queued events are still delivered before the disconnect shows
        assert_eq!(consumer.pop(Duration::from_millis(10)), Ok(1));
        assert_eq!(
            consumer.pop(Duration::from_millis(10)),
            Err(PopError::Disconnected)
        );
    }

    #[test]
    fn test_many_producers() {
        let (queue, consumer) = event_queue();
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.push((p, i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut last = [None; 4];
        for _ in 0..400 {
            let (p, i) = consumer.pop(Duration::from_millis(100)).unwrap();
            // FIFO per producer
            if let Some(prev) = last[p] {
                assert!(i > prev);
            }
            last[p] = Some(i);
        }
    }
}
