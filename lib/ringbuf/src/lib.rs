// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trace ring buffers for the UP Board drivers
//!
//! Each driver module keeps a small static ring buffer of recent events.
//! Entries are cheap to record (one short spin lock and a copy) and can be
//! dumped from a debugger or, on a host, walked with [`Ringbuf::iter`].
//!
//! ## Constraints
//!
//! The payload type must implement both `Copy` and `PartialEq`. If you use
//! the variants of the `ringbuf!` macro that leave the name implicit, you can
//! only have one per module.
//!
//! ## Creating a ring buffer
//!
//! ```
//! # use ringbuf::*;
//! #[derive(Copy, Clone, PartialEq)]
//! enum Trace {
//!     None,
//!     Loaded(u64),
//! }
//!
//! ringbuf!(Trace, 16, Trace::None);
//!
//! ringbuf_entry!(Trace::Loaded(0x0_0fff_ffff));
//! ```
//!
//! A name may be given to distinguish several buffers in one module:
//!
//! ```
//! # use ringbuf::*;
//! ringbuf!(SHIFT_RINGBUF, u32, 8, 0);
//! ringbuf_entry!(SHIFT_RINGBUF, 34);
//! ```
//!
//! Recording the same payload from the same line twice in a row does not use
//! a second slot; the `count` of the most recent entry is bumped instead.

#![cfg_attr(not(test), no_std)]

/// Re-exported so code generated by the macros can always find it.
pub use spin;

/// Declares a ringbuffer in the current module or context.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a ringbuffer named `NAME`,
/// containing entries of type `Type`, with room for `N` such entries, all of
/// which are initialized to `expr`.
///
/// The actual type of `NAME` will be `spin::Mutex<Ringbuf<T, N>>`. If the
/// name is omitted it defaults to `__RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::spin::Mutex<$crate::Ringbuf<$t, $n>> =
            $crate::spin::Mutex::new($crate::Ringbuf::new($init));
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
    ($t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
}

/// Inserts data into a named ringbuffer (which should have been declared with
/// the `ringbuf!` macro).
///
/// `ringbuf_entry!(NAME, expr)` will insert `expr` into the ringbuffer called
/// `NAME`; `ringbuf_entry!(expr)` uses `__RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate the payload before taking the lock so that a payload
        // expression that itself records an entry cannot deadlock.
        let (p, buf) = ($payload, &$buf);
        $crate::Ringbuf::entry(&mut *buf.lock(), line!() as u16, p);
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        let _ = &$payload;
    }};
    ($payload:expr) => {{
        let _ = &$payload;
    }};
}

/// Inserts data into a ringbuffer at the root of this crate.
#[allow(clippy::crate_in_macro_def)]
#[macro_export]
macro_rules! ringbuf_entry_root {
    ($buf:ident, $payload:expr) => {
        $crate::ringbuf_entry!(crate::$buf, $payload);
    };
    ($payload:expr) => {
        $crate::ringbuf_entry!(crate::__RINGBUF, $payload);
    };
}

/// A single [`Ringbuf`] slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

/// A ring buffer of parametrized type and size. See [`ringbuf!`].
#[derive(Debug)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: init,
            }; N],
        }
    }

    pub fn entry(&mut self, line: u16, payload: T) {
        // A `last` of None (nothing recorded yet) or one that is somehow out
        // of range both fall through to the "advance" path below, which
        // lands the entry in slot 0.
        let last = self.last.unwrap_or(usize::MAX);

        if let Some(ent) = self.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                if let Some(count) = ent.count.checked_add(1) {
                    ent.count = count;
                    return;
                }
            }
        }

        let next = last.wrapping_add(1);
        let ndx = if next >= N { 0 } else { next };

        let Some(ent) = self.buffer.get_mut(ndx) else {
            // Zero-sized ring buffer; nothing to record into.
            return;
        };
        *ent = RingbufEntry {
            line,
            generation: ent.generation.wrapping_add(1),
            count: 1,
            payload,
        };
        self.last = Some(ndx);
    }

    /// Walks recorded entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &RingbufEntry<T>> {
        let start = match self.last {
            Some(last) => last + 1,
            None => N,
        };
        self.buffer[start.min(N)..]
            .iter()
            .chain(self.buffer[..start.min(N)].iter())
            .filter(|e| e.count != 0)
    }

    /// Returns the most recently recorded payload, if any.
    pub fn latest(&self) -> Option<T> {
        self.last
            .and_then(|ndx| self.buffer.get(ndx))
            .map(|e| e.payload)
    }
}
