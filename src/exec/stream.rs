// src/exec/stream.rs

//! Per-stream accumulation and live subscription.
//!
//! Each child stream (stdout / stderr) gets one [`StreamBuffer`]. The reader
//! task pushes decoded chunks into it; every chunk is appended to the
//! accumulator and then handed to the registered subscribers, in that order.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::warn;

/// Callback invoked once per inbound chunk.
pub type ChunkCallback = Box<dyn FnMut(&str) + Send + 'static>;

#[derive(Default)]
struct StreamInner {
    text: String,
    subscribers: BTreeMap<u64, ChunkCallback>,
    /// Ids whose callbacks are out for delivery of the current chunk.
    in_flight: BTreeSet<u64>,
    /// In-flight ids unsubscribed before their callbacks came back.
    dropped: BTreeSet<u64>,
    next_id: u64,
    closed: bool,
}

/// Accumulator plus observer list for one output stream.
///
/// Callbacks run without the accumulator locked, so they may read
/// [`text`](Self::text), subscribe, or unsubscribe (themselves included).
/// Only [`follow`](Self::follow) must not be called on the same stream from
/// inside a callback.
#[derive(Default)]
pub struct StreamBuffer {
    inner: Mutex<StreamInner>,
    // Serializes chunk delivery with `follow` replays.
    delivery: Mutex<()>,
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run one callback. A panic is logged and reported as `false`.
fn deliver(id: u64, callback: &mut ChunkCallback, chunk: &str) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(chunk))) {
        Ok(()) => true,
        Err(_) => {
            warn!(subscriber = id, "output subscriber panicked; unsubscribing it");
            false
        }
    }
}

impl StreamBuffer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, StreamInner> {
        lock_ignoring_poison(&self.inner)
    }

    /// Append a chunk and fan it out to subscribers.
    ///
    /// Meant for the single reader task that owns the stream.
    pub fn push(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let _delivering = lock_ignoring_poison(&self.delivery);

        let mut batch = {
            let mut inner = self.lock();
            inner.text.push_str(chunk);
            let batch = std::mem::take(&mut inner.subscribers);
            inner.in_flight = batch.keys().copied().collect();
            batch
        };

        let mut failed = BTreeSet::new();
        for (&id, callback) in batch.iter_mut() {
            if self.lock().dropped.contains(&id) {
                continue;
            }
            if !deliver(id, callback, chunk) {
                failed.insert(id);
            }
        }

        let mut inner = self.lock();
        let dropped = std::mem::take(&mut inner.dropped);
        inner.in_flight.clear();
        for (id, callback) in batch {
            if !dropped.contains(&id) && !failed.contains(&id) {
                inner.subscribers.insert(id, callback);
            }
        }
    }

    /// Mark the stream as finished. Later pushes are still accepted but none
    /// are expected.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Everything received so far.
    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let inner = self.lock();
        inner.subscribers.len() + inner.in_flight.difference(&inner.dropped).count()
    }

    pub fn subscribe(self: &Arc<Self>, callback: ChunkCallback) -> Subscription {
        self.register(callback, false)
    }

    /// Like [`subscribe`](Self::subscribe), but the callback first receives
    /// everything accumulated so far as one chunk. Nothing is missed or seen
    /// twice, whatever the timing against the reader task.
    pub fn follow(self: &Arc<Self>, callback: ChunkCallback) -> Subscription {
        self.register(callback, true)
    }

    fn register(self: &Arc<Self>, mut callback: ChunkCallback, replay: bool) -> Subscription {
        let _delivering = replay.then(|| lock_ignoring_poison(&self.delivery));

        let (id, history) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            let history = if replay { inner.text.clone() } else { String::new() };
            (id, history)
        };

        let subscription = Subscription {
            id,
            stream: Arc::downgrade(self),
        };
        if !history.is_empty() && !deliver(id, &mut callback, &history) {
            return subscription;
        }

        self.lock().subscribers.insert(id, callback);
        subscription
    }
}

impl std::fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("StreamBuffer")
            .field("len", &inner.text.len())
            .field("subscribers", &inner.subscribers.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

/// Registration of one callback on one stream.
///
/// Dropping a `Subscription` leaves the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    stream: Weak<StreamBuffer>,
}

impl Subscription {
    /// Remove exactly this callback. Returns `false` if it was already gone.
    ///
    /// Callable from inside any callback on the same stream; an unsubscribed
    /// callback that has not run yet for the current chunk is skipped.
    pub fn unsubscribe(self) -> bool {
        let Some(stream) = self.stream.upgrade() else {
            return false;
        };
        let mut inner = stream.lock();
        if inner.subscribers.remove(&self.id).is_some() {
            return true;
        }
        inner.in_flight.contains(&self.id) && inner.dropped.insert(self.id)
    }
}

/// Incremental UTF-8 decoder for raw pipe reads.
///
/// A character split across two reads is held back until its remaining bytes
/// arrive. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (prefixed by any held-back bytes) as possible.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more.
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is held back at end of stream.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_without_subscribers() {
        let stream = StreamBuffer::new();
        stream.push("hello ");
        stream.push("world");
        assert_eq!(stream.text(), "hello world");
    }

    #[test]
    fn subscribers_see_every_chunk_until_unsubscribed() {
        let stream = StreamBuffer::new();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));

        let sink = Arc::clone(&seen);
        let sub = stream.subscribe(Box::new(move |chunk| {
            sink.lock().unwrap().push(chunk.to_string());
        }));

        stream.push("a");
        stream.push("b");
        assert!(sub.unsubscribe());
        stream.push("c");

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(stream.text(), "abc");
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_removes_only_its_own_callback() {
        let stream = StreamBuffer::new();
        let first = Arc::new(Mutex::new(String::new()));
        let second = Arc::new(Mutex::new(String::new()));

        let f = Arc::clone(&first);
        let sub_first = stream.subscribe(Box::new(move |c| f.lock().unwrap().push_str(c)));
        let s = Arc::clone(&second);
        let _sub_second = stream.subscribe(Box::new(move |c| s.lock().unwrap().push_str(c)));

        stream.push("x");
        sub_first.unsubscribe();
        stream.push("y");

        assert_eq!(*first.lock().unwrap(), "x");
        assert_eq!(*second.lock().unwrap(), "xy");
    }

    #[test]
    fn follow_replays_history_then_streams() {
        let stream = StreamBuffer::new();
        stream.push("early ");

        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let _sub = stream.follow(Box::new(move |c| sink.lock().unwrap().push_str(c)));
        stream.push("late");

        assert_eq!(*seen.lock().unwrap(), "early late");
    }

    #[test]
    fn callbacks_may_read_the_accumulator_and_unsubscribe_themselves() {
        let stream = StreamBuffer::new();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let (reader, sink, own) = (Arc::clone(&stream), Arc::clone(&seen), Arc::clone(&slot));
        let sub = stream.subscribe(Box::new(move |_| {
            sink.lock().unwrap().push(reader.text());
            if let Some(sub) = own.lock().unwrap().take() {
                assert!(sub.unsubscribe());
            }
        }));
        *slot.lock().unwrap() = Some(sub);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let writer = Arc::clone(&stream);
        std::thread::spawn(move || {
            writer.push("hello");
            writer.push(" again");
            let _ = done_tx.send(());
        });
        done_rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("push returned");

        assert_eq!(*seen.lock().unwrap(), vec!["hello"]);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribed_mid_delivery_skips_the_current_chunk() {
        let stream = StreamBuffer::new();
        let second_seen = Arc::new(Mutex::new(String::new()));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let other = Arc::clone(&slot);
        let _first = stream.subscribe(Box::new(move |_| {
            if let Some(sub) = other.lock().unwrap().take() {
                sub.unsubscribe();
            }
        }));
        let sink = Arc::clone(&second_seen);
        let second = stream.subscribe(Box::new(move |c| sink.lock().unwrap().push_str(c)));
        *slot.lock().unwrap() = Some(second);

        stream.push("x");
        stream.push("y");
        assert_eq!(*second_seen.lock().unwrap(), "");
        assert_eq!(stream.subscriber_count(), 1);
    }

    #[test]
    fn panicking_subscriber_is_dropped_and_others_keep_receiving() {
        let stream = StreamBuffer::new();
        let seen = Arc::new(Mutex::new(String::new()));

        let _bad = stream.subscribe(Box::new(|_| panic!("boom")));
        let sink = Arc::clone(&seen);
        let _good = stream.subscribe(Box::new(move |c| sink.lock().unwrap().push_str(c)));

        stream.push("a");
        stream.push("b");

        assert_eq!(*seen.lock().unwrap(), "ab");
        assert_eq!(stream.text(), "ab");
        assert_eq!(stream.subscriber_count(), 1);
    }

    #[test]
    fn decoder_holds_back_split_characters() {
        let bytes = "é€".as_bytes();
        let mut decoder = ChunkDecoder::new();

        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..3]), "é");
        assert_eq!(decoder.decode(&bytes[3..]), "€");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn decoder_flushes_truncated_tail_lossily() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(&"€".as_bytes()[..2]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
