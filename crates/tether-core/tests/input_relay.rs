//! Integration tests for the channel and input bridge across threads.
//!
//! The "program" here is a plain thread reading from an `InputBridge`; the
//! foreground answers each `RequestInput` event through the producer.

use std::io::Read;
use std::thread;

use tether_core::bridge::{InputBridge, InteractiveSource};
use tether_core::channel::SharedChannel;
use tether_core::error::ChannelError;
use tether_core::execute::{EventSink, HostEvent};

#[test]
fn test_chunks_are_reconstructed_in_order() {
    let (producer, consumer) = SharedChannel::allocate(64).unwrap();
    let (sink, mut events) = EventSink::channel();

    let reader = thread::spawn(move || {
        let mut bridge = InputBridge::new(InteractiveSource::new(consumer, sink));
        let mut received = Vec::new();
        bridge.read_to_end(&mut received).unwrap();
        received
    });

    let chunks: [&[u8]; 4] = [b"first line\n", b"partial", b" rest\n", b"\xe2\x98\x83\n"];
    for chunk in chunks {
        assert_eq!(events.blocking_recv(), Some(HostEvent::RequestInput));
        assert_eq!(producer.publish(chunk).unwrap(), chunk.len());
    }
    assert_eq!(events.blocking_recv(), Some(HostEvent::RequestInput));
    producer.end_of_input().unwrap();

    assert_eq!(reader.join().unwrap(), chunks.concat());
}

#[test]
fn test_short_read_returns_what_is_available() {
    let (producer, consumer) = SharedChannel::allocate(64).unwrap();
    let (sink, mut events) = EventSink::channel();

    let reader = thread::spawn(move || {
        let mut bridge = InputBridge::new(InteractiveSource::new(consumer, sink));
        let mut buf = [0u8; 8];
        let n = bridge.read(&mut buf).unwrap();
        buf[..n].to_vec()
    });

    assert_eq!(events.blocking_recv(), Some(HostEvent::RequestInput));
    producer.publish(b"abc").unwrap();
    assert_eq!(reader.join().unwrap(), b"abc");
}

#[test]
fn test_end_of_input_is_observed_once_and_sticks() {
    let (producer, consumer) = SharedChannel::allocate(64).unwrap();
    let (sink, mut events) = EventSink::channel();

    let reader = thread::spawn(move || {
        let mut bridge = InputBridge::new(InteractiveSource::new(consumer, sink));
        let mut buf = [0u8; 8];
        let reads: Vec<usize> = (0..3).map(|_| bridge.read(&mut buf).unwrap()).collect();
        reads
    });

    assert_eq!(events.blocking_recv(), Some(HostEvent::RequestInput));
    producer.end_of_input().unwrap();

    assert_eq!(reader.join().unwrap(), vec![0, 0, 0]);
    // Only the first read asked; the reader and its sink are gone now.
    assert_eq!(events.blocking_recv(), None);
}

#[test]
fn test_unsolicited_and_duplicate_publish_are_rejected() {
    let (producer, consumer) = SharedChannel::allocate(16).unwrap();
    let (sink, mut events) = EventSink::channel();

    assert_eq!(producer.publish(b"early\n"), Err(ChannelError::Unsolicited));

    let reader = thread::spawn(move || {
        let mut bridge = InputBridge::new(InteractiveSource::new(consumer, sink));
        let mut line = String::new();
        std::io::BufRead::read_line(&mut bridge, &mut line).unwrap();
        line
    });

    assert_eq!(events.blocking_recv(), Some(HostEvent::RequestInput));
    producer.publish(b"one\n").unwrap();
    // Either still pending pickup or already consumed: never accepted twice.
    assert!(matches!(
        producer.publish(b"two\n"),
        Err(ChannelError::AlreadyPublished) | Err(ChannelError::Unsolicited)
    ));

    assert_eq!(reader.join().unwrap(), "one\n");
}

#[test]
fn test_close_unblocks_a_parked_reader() {
    let (producer, consumer) = SharedChannel::allocate(16).unwrap();
    let (sink, mut events) = EventSink::channel();

    let reader = thread::spawn(move || {
        let mut bridge = InputBridge::new(InteractiveSource::new(consumer, sink));
        let mut buf = [0u8; 4];
        bridge.read(&mut buf).unwrap()
    });

    assert_eq!(events.blocking_recv(), Some(HostEvent::RequestInput));
    producer.closer().close();
    assert_eq!(reader.join().unwrap(), 0);
}
