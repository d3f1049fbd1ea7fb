//! # Kernel Console
//!
//! Byte-oriented diagnostic output for the kernel, usable from the first
//! instruction of `notmain` onwards. Board code installs a transmit function
//! with [`set_sink`]; everything printed through [`console_trace!`] or the
//! [`ConsoleLogger`] is pushed through it one byte at a time.
//!
//! ```text
//! log::info!(..)          console_trace!(..)
//!       ↓                        ↓
//! ConsoleLogger  ──────→  ConsoleSink (fmt::Write)
//!                                ↓
//!                         installed fn(u8), e.g. mini UART
//! ```
//!
//! Nothing is buffered or allocated. Output produced before a sink is
//! installed is dropped.
//!
//! ## Feature `enabled` (default)
//!
//! Without it every write compiles to a no-op, so release images can drop
//! console output entirely.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_console::{ConsoleLogger, console_trace, set_sink};
//! use log::{LevelFilter, info};
//!
//! fn uart_putc(_byte: u8) { /* poll LSR, write IO */ }
//!
//! static LOGGER: ConsoleLogger = ConsoleLogger::new(LevelFilter::Debug);
//!
//! set_sink(uart_putc);
//! LOGGER.init().expect("logger installed twice");
//!
//! info!("virtual memory online");
//! console_trace!("pc={:#010x}\n", 0x8000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use console_fmt::set_sink;
pub use logger::ConsoleLogger;

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod console_fmt {
    use core::fmt::{self, Write};
    use core::sync::atomic::{AtomicPtr, Ordering};

    static SINK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

    /// Routes all console output to `sink`, replacing any previous one.
    pub fn set_sink(sink: fn(u8)) {
        SINK.store(sink as *mut (), Ordering::Release);
    }

    #[inline]
    fn sink() -> Option<fn(u8)> {
        let raw = SINK.load(Ordering::Acquire);
        if raw.is_null() {
            return None;
        }
        // Safety: the only non-null value ever stored is a `fn(u8)`.
        Some(unsafe { core::mem::transmute::<*mut (), fn(u8)>(raw) })
    }

    pub struct ConsoleSink;

    impl Write for ConsoleSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            if let Some(putc) = sink() {
                s.bytes().for_each(putc);
            }
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn console_write(args: fmt::Arguments) {
        // Best effort; a failing Display impl only truncates the line.
        let _ = fmt::write(&mut ConsoleSink, args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod console_fmt {
    use core::fmt;

    pub const fn set_sink(_: fn(u8)) {}

    #[doc(hidden)]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub const fn console_write(_: fmt::Arguments) {}
}

/// Prints to the console without going through `log`.
#[macro_export]
macro_rules! console_trace {
    ($($arg:tt)*) => {{
        $crate::console_fmt::console_write(core::format_args!($($arg)*));
    }};
}
