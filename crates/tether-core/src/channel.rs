//! Single-producer, single-consumer input handoff.
//!
//! The foreground owns an [`InputProducer`], the execution host owns the
//! matching [`InputConsumer`]. One chunk of bytes crosses per request:
//!
//! ```text
//! consumer                      control record              producer
//!   request()  ──────────────►  requested=1 ready=0 len=0
//!   wait()  (parked)                                        publish(bytes)
//!                               data, len, ready=1  ◄────── notify
//!   ◄── Payload::Data           ready=0 requested=0
//! ```
//!
//! A zero-length publish is end of input. `close()` is the synthetic end of
//! input used when a run is aborted and wakes a parked consumer whether or not
//! a request is armed.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::{ChannelError, Error, Result};

/// Default size of the shared input region.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Largest region `SharedChannel::allocate` will hand out.
pub const MAX_CHANNEL_CAPACITY: usize = 16 * 1024 * 1024;

/// What a consumer receives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A non-empty chunk of input bytes.
    Data(Vec<u8>),
    /// The producer signaled end of input (or the channel was closed).
    EndOfInput,
}

struct ControlRecord {
    data: Box<[u8]>,
    ready: bool,
    length: usize,
    requested: bool,
    closed: bool,
    released: bool,
}

struct Shared {
    record: Mutex<ControlRecord>,
    wake: Condvar,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControlRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Allocator for producer/consumer token pairs.
pub struct SharedChannel;

impl SharedChannel {
    /// Allocate a zeroed region of `capacity` bytes and its control record.
    pub fn allocate(capacity: usize) -> Result<(InputProducer, InputConsumer)> {
        if capacity == 0 || capacity > MAX_CHANNEL_CAPACITY {
            return Err(Error::Resource(format!(
                "input channel capacity must be between 1 and {} bytes, got {}",
                MAX_CHANNEL_CAPACITY, capacity
            )));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(capacity).map_err(|e| {
            Error::Resource(format!("cannot allocate {} byte input region: {}", capacity, e))
        })?;
        data.resize(capacity, 0);

        let shared = Arc::new(Shared {
            record: Mutex::new(ControlRecord {
                data: data.into_boxed_slice(),
                ready: false,
                length: 0,
                requested: false,
                closed: false,
                released: false,
            }),
            wake: Condvar::new(),
            capacity,
        });

        Ok((
            InputProducer {
                shared: Arc::clone(&shared),
            },
            InputConsumer { shared },
        ))
    }
}

/// Foreground half of a channel. Not `Clone`: there is exactly one producer.
pub struct InputProducer {
    shared: Arc<Shared>,
}

impl InputProducer {
    /// Size of the shared region.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Whether the consumer is waiting for a payload that was not sent yet.
    pub fn is_request_pending(&self) -> bool {
        let record = self.shared.lock();
        record.requested && !record.ready && !record.closed
    }

    /// Hand `bytes` to the waiting consumer.
    ///
    /// Input longer than the region is truncated to its capacity. Returns the
    /// number of bytes actually delivered.
    pub fn publish(&self, bytes: &[u8]) -> std::result::Result<usize, ChannelError> {
        let mut record = self.shared.lock();
        if record.released || record.closed {
            return Err(ChannelError::Released);
        }
        if !record.requested {
            return Err(ChannelError::Unsolicited);
        }
        if record.ready {
            return Err(ChannelError::AlreadyPublished);
        }

        let len = bytes.len().min(self.shared.capacity);
        if len < bytes.len() {
            tracing::warn!(
                "Input of {} bytes truncated to channel capacity of {} bytes",
                bytes.len(),
                self.shared.capacity
            );
        }

        record.data[..len].copy_from_slice(&bytes[..len]);
        record.length = len;
        record.ready = true;
        self.shared.wake.notify_one();

        Ok(len)
    }

    /// Answer the pending request with end of input.
    pub fn end_of_input(&self) -> std::result::Result<(), ChannelError> {
        self.publish(&[]).map(|_| ())
    }

    /// Close the channel, waking a parked consumer with end of input.
    ///
    /// Unlike [`end_of_input`](Self::end_of_input) this needs no pending
    /// request and stays in effect for every later request.
    pub fn close(&self) {
        let mut record = self.shared.lock();
        record.closed = true;
        self.shared.wake.notify_all();
    }

    /// A cloneable handle that can only close the channel.
    pub fn closer(&self) -> ChannelCloser {
        ChannelCloser {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Release the channel at the end of its session.
    pub fn release(self) {
        let mut record = self.shared.lock();
        record.released = true;
        record.closed = true;
        record.length = 0;
        self.shared.wake.notify_all();
    }
}

impl Drop for InputProducer {
    fn drop(&mut self) {
        // Without a producer nothing can ever wake the consumer.
        let mut record = self.shared.lock();
        record.closed = true;
        self.shared.wake.notify_all();
    }
}

/// Close-only handle, used from abort hooks.
#[derive(Clone)]
pub struct ChannelCloser {
    shared: Weak<Shared>,
}

impl ChannelCloser {
    /// Same as [`InputProducer::close`]. No-op once both halves are gone.
    pub fn close(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut record = shared.lock();
            record.closed = true;
            shared.wake.notify_all();
        }
    }
}

/// Background half of a channel. Not `Clone`: there is exactly one consumer.
pub struct InputConsumer {
    shared: Arc<Shared>,
}

impl InputConsumer {
    /// Whether every further request will end immediately with end of input.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Arm one input request.
    ///
    /// Resets the control record so a stale length is never observed, then
    /// returns a guard whose [`PendingInput::wait`] parks until the producer
    /// answers. The guard borrows the consumer, so only one request can be
    /// armed at a time.
    pub fn request(&mut self) -> PendingInput<'_> {
        {
            let mut record = self.shared.lock();
            record.ready = false;
            record.length = 0;
            record.requested = true;
        }
        PendingInput { consumer: self }
    }

    /// Arm a request and block until it is answered.
    pub fn consume(&mut self) -> Payload {
        self.request().wait()
    }
}

/// An armed request. Dropping it without waiting withdraws the request.
pub struct PendingInput<'a> {
    consumer: &'a mut InputConsumer,
}

impl PendingInput<'_> {
    /// Park until the producer publishes or the channel closes.
    pub fn wait(self) -> Payload {
        let shared = &self.consumer.shared;
        let mut record = shared.lock();
        while !record.ready && !record.closed {
            record = shared.wake.wait(record).unwrap_or_else(PoisonError::into_inner);
        }

        let payload = if record.ready && record.length > 0 {
            Payload::Data(record.data[..record.length].to_vec())
        } else {
            Payload::EndOfInput
        };
        record.ready = false;
        record.requested = false;
        payload
    }
}

impl Drop for PendingInput<'_> {
    fn drop(&mut self) {
        let mut record = self.consumer.shared.lock();
        record.requested = false;
        record.ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn wait_for_request(producer: &InputProducer) {
        while !producer.is_request_pending() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_allocate_rejects_zero_capacity() {
        assert!(matches!(SharedChannel::allocate(0), Err(Error::Resource(_))));
        assert!(matches!(
            SharedChannel::allocate(MAX_CHANNEL_CAPACITY + 1),
            Err(Error::Resource(_))
        ));
    }

    #[test]
    fn test_publish_without_request_is_rejected() {
        let (producer, _consumer) = SharedChannel::allocate(16).unwrap();
        assert_eq!(producer.publish(b"hi\n"), Err(ChannelError::Unsolicited));
        assert_eq!(producer.end_of_input(), Err(ChannelError::Unsolicited));
    }

    #[test]
    fn test_publish_then_wait() {
        let (producer, mut consumer) = SharedChannel::allocate(16).unwrap();
        let pending = consumer.request();
        assert!(producer.is_request_pending());
        assert_eq!(producer.publish(b"abc"), Ok(3));
        assert_eq!(pending.wait(), Payload::Data(b"abc".to_vec()));
        assert!(!producer.is_request_pending());
    }

    #[test]
    fn test_second_publish_for_same_request_is_rejected() {
        let (producer, mut consumer) = SharedChannel::allocate(16).unwrap();
        let pending = consumer.request();
        producer.publish(b"one").unwrap();
        assert_eq!(producer.publish(b"two"), Err(ChannelError::AlreadyPublished));
        assert_eq!(pending.wait(), Payload::Data(b"one".to_vec()));

        // The request is answered; nothing is queued behind it.
        assert_eq!(producer.publish(b"three"), Err(ChannelError::Unsolicited));
    }

    #[test]
    fn test_oversized_input_is_truncated() {
        let (producer, mut consumer) = SharedChannel::allocate(4).unwrap();
        let pending = consumer.request();
        assert_eq!(producer.publish(b"abcdefgh"), Ok(4));
        assert_eq!(pending.wait(), Payload::Data(b"abcd".to_vec()));
    }

    #[test]
    fn test_zero_length_publish_is_end_of_input() {
        let (producer, mut consumer) = SharedChannel::allocate(8).unwrap();
        let pending = consumer.request();
        producer.end_of_input().unwrap();
        assert_eq!(pending.wait(), Payload::EndOfInput);
    }

    #[test]
    fn test_consume_blocks_until_publish() {
        let (producer, mut consumer) = SharedChannel::allocate(32).unwrap();
        let host = thread::spawn(move || consumer.consume());

        wait_for_request(&producer);
        producer.publish(b"from foreground").unwrap();

        assert_eq!(host.join().unwrap(), Payload::Data(b"from foreground".to_vec()));
    }

    #[test]
    fn test_close_wakes_parked_consumer() {
        let (producer, mut consumer) = SharedChannel::allocate(32).unwrap();
        let host = thread::spawn(move || {
            let first = consumer.consume();
            let second = consumer.consume();
            (first, second)
        });

        wait_for_request(&producer);
        producer.close();

        let (first, second) = host.join().unwrap();
        assert_eq!(first, Payload::EndOfInput);
        assert_eq!(second, Payload::EndOfInput);
    }

    #[test]
    fn test_release_ends_input_and_rejects_nothing_afterwards() {
        let (producer, mut consumer) = SharedChannel::allocate(8).unwrap();
        producer.release();
        assert!(consumer.is_closed());
        assert_eq!(consumer.consume(), Payload::EndOfInput);
    }

    #[test]
    fn test_dropped_producer_unblocks_consumer() {
        let (producer, mut consumer) = SharedChannel::allocate(8).unwrap();
        let host = thread::spawn(move || consumer.consume());
        wait_for_request(&producer);
        drop(producer);
        assert_eq!(host.join().unwrap(), Payload::EndOfInput);
    }

    #[test]
    fn test_closer_wakes_consumer_from_another_thread() {
        let (producer, mut consumer) = SharedChannel::allocate(8).unwrap();
        let closer = producer.closer();
        let host = thread::spawn(move || consumer.consume());
        wait_for_request(&producer);

        thread::spawn(move || closer.close()).join().unwrap();
        assert_eq!(host.join().unwrap(), Payload::EndOfInput);
        assert_eq!(producer.publish(b"late"), Err(ChannelError::Released));
    }

    #[test]
    fn test_leaked_request_is_rearmed() {
        let (producer, mut consumer) = SharedChannel::allocate(8).unwrap();
        std::mem::forget(consumer.request());
        assert!(producer.is_request_pending());

        // Arming again resets the record instead of failing.
        let pending = consumer.request();
        producer.publish(b"y").unwrap();
        assert_eq!(pending.wait(), Payload::Data(b"y".to_vec()));
    }

    #[test]
    fn test_withdrawn_request_can_be_rearmed() {
        let (producer, mut consumer) = SharedChannel::allocate(8).unwrap();
        drop(consumer.request());
        assert!(!producer.is_request_pending());
        let pending = consumer.request();
        producer.publish(b"x").unwrap();
        assert_eq!(pending.wait(), Payload::Data(b"x".to_vec()));
    }
}
