//! Bounded text stream for diagnostics
//!
//! [`DebugStream`] collects formatted diagnostic lines in a fixed-capacity
//! buffer until a transport drains them with [`DebugStream::pop_with`]. It
//! never grows and never writes past its capacity: a message that does not fit
//! is either dropped or, under [`OverflowPolicy::ClearAndRetry`], written into
//! a freshly cleared buffer. The retry happens at most once per append.
//!
//! ## Capacity accounting
//!
//! One byte of storage is always kept back for a terminator, and a message is
//! accepted only while `len + message < N - 1`. The stored text therefore
//! satisfies `len < N - 1` at all times, and streams with `N < 2` accept
//! nothing.
//!
//! ```rust,ignore
//! let mut stream: DebugStream<256> = DebugStream::new();
//! debug_print!(&mut stream, "Sensor 0x{:x} connected.\r\n", 0x76);
//!
//! stream.pop_with(|bytes| transport.send(bytes));
//! ```

use core::fmt::{self, Write};

use heapless::Vec;
use log::warn;
use serde::{Deserialize, Serialize};

/// What to do when a message does not fit in the remaining space
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the message and keep the existing content
    Drop,
    /// Discard the existing content and store the message, provided it fits
    /// in an empty stream
    #[default]
    ClearAndRetry,
}

/// Result of a single [`DebugStream::append`]
///
/// Overflow is never an error for the caller; the outcome only tells what
/// happened to the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The message was added after the existing content
    Appended,
    /// The existing content was discarded to make room for the message
    ClearedAndAppended,
    /// The message did not fit and was discarded
    Dropped {
        /// Length of the formatted message in bytes
        needed: usize,
    },
    /// A `Display` implementation reported an error while formatting
    FormatFailed,
}

impl AppendOutcome {
    /// Whether the message ended up in the stream
    pub const fn is_stored(self) -> bool {
        matches!(self, Self::Appended | Self::ClearedAndAppended)
    }
}

/// Fixed-capacity append-only text buffer
#[derive(Debug)]
pub struct DebugStream<const N: usize> {
    buffer: Vec<u8, N>,
    policy: OverflowPolicy,
}

impl<const N: usize> Default for DebugStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DebugStream<N> {
    /// Create an empty stream using [`OverflowPolicy::ClearAndRetry`]
    pub const fn new() -> Self {
        Self::with_policy(OverflowPolicy::ClearAndRetry)
    }

    /// Create an empty stream with an explicit overflow policy
    pub const fn with_policy(policy: OverflowPolicy) -> Self {
        Self {
            buffer: Vec::new(),
            policy,
        }
    }

    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Total storage in bytes, including the reserved terminator byte
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of text bytes currently stored
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether there is anything to transmit
    pub fn available(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Longest message that can still be appended without overflowing
    pub fn remaining(&self) -> usize {
        self.free().saturating_sub(1)
    }

    /// Stored text as raw bytes, ready for a transport
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Stored text as a string slice
    pub fn as_str(&self) -> &str {
        // Only whole `&str` pieces are ever written, so this cannot fail.
        core::str::from_utf8(&self.buffer).unwrap_or_default()
    }

    /// Forget the stored text, keeping the storage
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Hand the stored text to `f`, then clear the stream
    ///
    /// Returns `None` without calling `f` when the stream is empty.
    pub fn pop_with<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        if self.buffer.is_empty() {
            return None;
        }

        let result = f(&self.buffer);
        self.clear();
        Some(result)
    }

    /// Format `args` and append the text according to the overflow policy
    pub fn append(&mut self, args: fmt::Arguments<'_>) -> AppendOutcome {
        let mut counter = LengthCounter(0);
        if counter.write_fmt(args).is_err() {
            warn!("Debug stream: formatting failed, message discarded");
            return AppendOutcome::FormatFailed;
        }
        let needed = counter.0;

        if needed < self.free() {
            return Self::write_into(&mut self.buffer, args, needed);
        }

        // Would the message fit once everything already stored is gone?
        // Format into scratch storage first so a failed retry keeps the old content.
        if self.policy == OverflowPolicy::ClearAndRetry && needed < N.saturating_sub(1) {
            let mut scratch: Vec<u8, N> = Vec::new();
            return match Self::write_into(&mut scratch, args, needed) {
                AppendOutcome::Appended => {
                    self.buffer = scratch;
                    AppendOutcome::ClearedAndAppended
                }
                other => other,
            };
        }

        warn!(
            "Debug stream too small: {} bytes needed, {} available",
            needed,
            self.remaining()
        );
        AppendOutcome::Dropped { needed }
    }

    /// Bytes left for a message plus its terminator
    fn free(&self) -> usize {
        N.saturating_sub(self.buffer.len() + 1)
    }

    /// Write `args` after the content of `buffer`, rolling back on any failure
    fn write_into(buffer: &mut Vec<u8, N>, args: fmt::Arguments<'_>, needed: usize) -> AppendOutcome {
        let start = buffer.len();
        let mut writer = TailWriter {
            buffer: &mut *buffer,
            limit: N.saturating_sub(2),
            overflowed: false,
        };

        match writer.write_fmt(args) {
            Ok(()) => AppendOutcome::Appended,
            Err(_) => {
                let overflowed = writer.overflowed;
                buffer.truncate(start);
                if overflowed {
                    // The second formatting pass produced more text than the first.
                    warn!("Debug stream: message grew while formatting, discarded");
                    AppendOutcome::Dropped { needed }
                } else {
                    warn!("Debug stream: formatting failed, message discarded");
                    AppendOutcome::FormatFailed
                }
            }
        }
    }
}

/// Counts formatted bytes without storing them
struct LengthCounter(usize);

impl Write for LengthCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

/// Appends into the stream storage, refusing to grow past `limit` bytes
struct TailWriter<'a, const N: usize> {
    buffer: &'a mut Vec<u8, N>,
    limit: usize,
    overflowed: bool,
}

impl<const N: usize> Write for TailWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.buffer.len() + s.len() > self.limit {
            self.overflowed = true;
            return Err(fmt::Error);
        }
        if self.buffer.extend_from_slice(s.as_bytes()).is_err() {
            self.overflowed = true;
            return Err(fmt::Error);
        }
        Ok(())
    }
}

/// Destination for formatted diagnostic text
pub trait DebugSink {
    fn print(&mut self, args: fmt::Arguments<'_>);
}

impl<const N: usize> DebugSink for DebugStream<N> {
    fn print(&mut self, args: fmt::Arguments<'_>) {
        self.append(args);
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn print(&mut self, _args: fmt::Arguments<'_>) {}
}

/// Log a diagnostic line and append it to a [`DebugSink`]
///
/// The text goes to the `log` facade at debug level (the console path) and
/// to the sink (the buffered path for later transmission).
#[macro_export]
macro_rules! debug_print {
    ($sink:expr, $($arg:tt)+) => {{
        $crate::__log::debug!($($arg)+);
        $crate::debug_stream::DebugSink::print(&mut *$sink, ::core::format_args!($($arg)+));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FailingDisplay;

    impl fmt::Display for FailingDisplay {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let mut stream: DebugStream<64> = DebugStream::new();

        let outcome = stream.append(format_args!("t: {} h: {}\r\n", 21, 45));

        assert_eq!(outcome, AppendOutcome::Appended);
        assert_eq!(stream.data(), b"t: 21 h: 45\r\n");
        assert_eq!(stream.as_str(), "t: 21 h: 45\r\n");
        assert_eq!(stream.len(), 13);
        assert!(stream.available());
    }

    #[test]
    fn test_appends_form_one_contiguous_run() {
        let mut stream: DebugStream<64> = DebugStream::new();

        stream.append(format_args!("abc"));
        stream.append(format_args!("{}", 123));
        stream.append(format_args!("-{:x}", 0x76));

        assert_eq!(stream.as_str(), "abc123-76");
    }

    #[test]
    fn test_clear_resets_size() {
        let mut stream: DebugStream<32> = DebugStream::new();
        stream.append(format_args!("hello"));

        stream.clear();

        assert!(!stream.available());
        assert_eq!(stream.len(), 0);
        assert_eq!(stream.capacity(), 32);
        assert_eq!(stream.remaining(), 30);
    }

    #[test]
    fn test_len_stays_below_capacity_minus_one() {
        for policy in [OverflowPolicy::Drop, OverflowPolicy::ClearAndRetry] {
            let mut stream: DebugStream<24> = DebugStream::with_policy(policy);

            for i in 0..200usize {
                let width = i % 30;
                stream.append(format_args!("{:>width$}", i, width = width));
                assert!(
                    stream.len() < stream.capacity() - 1,
                    "len {} exceeded bound with {:?}",
                    stream.len(),
                    policy
                );
            }
        }
    }

    #[test]
    fn test_exact_fit_boundary() {
        let mut stream: DebugStream<8> = DebugStream::with_policy(OverflowPolicy::Drop);

        assert_eq!(stream.remaining(), 6);
        assert_eq!(stream.append(format_args!("123456")), AppendOutcome::Appended);
        assert_eq!(stream.len(), 6);
        assert_eq!(stream.remaining(), 0);

        assert_eq!(
            stream.append(format_args!("7")),
            AppendOutcome::Dropped { needed: 1 }
        );
        assert_eq!(stream.as_str(), "123456");
    }

    #[test]
    fn test_drop_policy_keeps_existing_content() {
        let mut stream: DebugStream<16> = DebugStream::with_policy(OverflowPolicy::Drop);
        stream.append(format_args!("0123456789"));

        let outcome = stream.append(format_args!("abcdef"));

        assert_eq!(outcome, AppendOutcome::Dropped { needed: 6 });
        assert_eq!(stream.as_str(), "0123456789");
    }

    #[test]
    fn test_clear_and_retry_replaces_content() {
        let mut stream: DebugStream<16> = DebugStream::with_policy(OverflowPolicy::ClearAndRetry);
        stream.append(format_args!("0123456789"));

        let outcome = stream.append(format_args!("abcdef"));

        assert_eq!(outcome, AppendOutcome::ClearedAndAppended);
        assert!(outcome.is_stored());
        assert_eq!(stream.as_str(), "abcdef");
    }

    #[test]
    fn test_message_larger_than_empty_stream_is_dropped() {
        let mut stream: DebugStream<8> = DebugStream::new();
        stream.append(format_args!("abc"));

        let outcome = stream.append(format_args!("0123456789"));

        assert_eq!(outcome, AppendOutcome::Dropped { needed: 10 });
        assert_eq!(stream.as_str(), "abc", "content must survive a hopeless retry");
    }

    #[test]
    fn test_tiny_capacities_are_noops() {
        let mut empty: DebugStream<0> = DebugStream::new();
        let mut single: DebugStream<1> = DebugStream::new();

        assert!(!empty.append(format_args!("x")).is_stored());
        assert!(!single.append(format_args!("x")).is_stored());
        assert!(!empty.append(format_args!("")).is_stored());
        assert_eq!(empty.len(), 0);
        assert_eq!(single.len(), 0);
        assert_eq!(single.remaining(), 0);
        assert!(empty.pop_with(|_| ()).is_none());
    }

    #[test]
    fn test_format_failure_leaves_no_partial_text() {
        let mut stream: DebugStream<64> = DebugStream::new();
        stream.append(format_args!("keep;"));

        let outcome = stream.append(format_args!("partial {}", FailingDisplay));

        assert_eq!(outcome, AppendOutcome::FormatFailed);
        assert_eq!(stream.as_str(), "keep;");
    }

    /// Formats fine when measured, then fails on the write pass
    struct FailsOnSecondPass {
        passes: Cell<u32>,
    }

    impl fmt::Display for FailsOnSecondPass {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let pass = self.passes.get() + 1;
            self.passes.set(pass);
            if pass > 1 {
                return Err(fmt::Error);
            }
            f.write_str("abcdefgh")
        }
    }

    #[test]
    fn test_failed_retry_keeps_existing_content() {
        let mut stream: DebugStream<16> = DebugStream::with_policy(OverflowPolicy::ClearAndRetry);
        stream.append(format_args!("0123456789"));
        let value = FailsOnSecondPass {
            passes: Cell::new(0),
        };

        let outcome = stream.append(format_args!("{}", value));

        assert_eq!(outcome, AppendOutcome::FormatFailed);
        assert_eq!(value.passes.get(), 2);
        assert_eq!(stream.as_str(), "0123456789", "old content must survive a failed retry");
    }

    #[test]
    fn test_pop_with_drains_stream() {
        let mut stream: DebugStream<64> = DebugStream::new();
        stream.append(format_args!("line one\r\n"));

        let sent = stream.pop_with(|bytes| bytes.len());

        assert_eq!(sent, Some(10));
        assert!(!stream.available());
        assert_eq!(stream.pop_with(|bytes| bytes.len()), None);
    }

    #[test]
    fn test_debug_print_macro_appends_to_sink() {
        let mut stream: DebugStream<64> = DebugStream::new();

        crate::debug_print!(&mut stream, "Sensor 0x{:x} connected.\r\n", 0x76);
        crate::debug_print!(&mut NullSink, "ignored {}", 1);

        assert_eq!(stream.as_str(), "Sensor 0x76 connected.\r\n");
    }
}
