//! Chrome-trace ("flame style") profiling spans.
//!
//! Build with `--features profiling` to record; the default build compiles
//! every call site down to nothing.
//!
//! Usage:
//!
//! ```ignore
//! sim_runtime::profiling::profiler::begin("profile/trace.json");
//! {
//!     let _g = sim_runtime::profiling::profiler::span("frame");
//!     // work...
//! }
//! sim_runtime::profiling::profiler::finish();
//! ```

use std::borrow::Cow;
use std::path::Path;

/// A span name; accepts `&'static str`, `String`, or `Cow<'static, str>`.
pub struct SpanName(pub Cow<'static, str>);

impl From<&'static str> for SpanName {
    fn from(s: &'static str) -> Self {
        SpanName(Cow::Borrowed(s))
    }
}

impl From<String> for SpanName {
    fn from(s: String) -> Self {
        SpanName(Cow::Owned(s))
    }
}

#[cfg(feature = "profiling")]
mod enabled {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Mutex, OnceLock};
    use std::time::Instant;

    use super::*;

    struct Event {
        name: String,
        ts_us: u64,
        dur_us: u64,
        tid: u64,
    }

    struct TraceState {
        start: Instant,
        out_path: PathBuf,
        recording: AtomicBool,
        events: Mutex<Vec<Event>>,
    }

    static STATE: OnceLock<TraceState> = OnceLock::new();
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
    }

    /// Starts recording; the trace is written to `path` by [`finish`].
    pub fn begin<P: AsRef<Path>>(path: P) {
        let _ = STATE.set(TraceState {
            start: Instant::now(),
            out_path: path.as_ref().to_path_buf(),
            recording: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
        });
    }

    /// Stops recording and writes the trace JSON.
    pub fn finish() {
        let Some(state) = STATE.get() else { return };
        state.recording.store(false, Ordering::Release);
        if let Err(error) = write_trace(state) {
            eprintln!("sim_runtime profiler: failed to write trace: {error}");
        }
    }

    /// Opens a span; the guard records a complete event when dropped.
    pub fn span(name: impl Into<SpanName>) -> SpanGuard {
        let Some(state) = STATE.get() else {
            return SpanGuard::disabled();
        };
        if !state.recording.load(Ordering::Acquire) {
            return SpanGuard::disabled();
        }
        SpanGuard {
            name: name.into().0.into_owned(),
            ts0: state.start.elapsed().as_micros() as u64,
            tid: TID.with(|t| *t),
            active: true,
        }
    }

    /// RAII guard closing its span on drop.
    pub struct SpanGuard {
        name: String,
        ts0: u64,
        tid: u64,
        active: bool,
    }

    impl SpanGuard {
        fn disabled() -> Self {
            Self {
                name: String::new(),
                ts0: 0,
                tid: 0,
                active: false,
            }
        }
    }

    impl Drop for SpanGuard {
        fn drop(&mut self) {
            if !self.active {
                return;
            }
            let Some(state) = STATE.get() else { return };
            let ts1 = state.start.elapsed().as_micros() as u64;
            let event = Event {
                name: std::mem::take(&mut self.name),
                ts_us: self.ts0,
                dur_us: ts1.saturating_sub(self.ts0),
                tid: self.tid,
            };
            if let Ok(mut events) = state.events.lock() {
                events.push(event);
            }
        }
    }

    fn write_trace(state: &TraceState) -> std::io::Result<()> {
        let events = {
            let mut guard = state.events.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };

        if let Some(parent) = state.out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&state.out_path)?);

        write!(out, "{{\"traceEvents\":[")?;
        for (i, event) in events.iter().enumerate() {
            if i > 0 {
                write!(out, ",")?;
            }
            write!(out, "{{\"name\":")?;
            write_json_string(&mut out, &event.name)?;
            write!(
                out,
                ",\"cat\":\"runtime\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":1,\"tid\":{}}}",
                event.ts_us, event.dur_us, event.tid
            )?;
        }
        write!(out, "]}}")?;
        out.flush()
    }

    fn write_json_string<W: Write>(out: &mut W, s: &str) -> std::io::Result<()> {
        write!(out, "\"")?;
        for ch in s.chars() {
            match ch {
                '"' => write!(out, "\\\"")?,
                '\\' => write!(out, "\\\\")?,
                '\n' => write!(out, "\\n")?,
                '\r' => write!(out, "\\r")?,
                '\t' => write!(out, "\\t")?,
                c if c.is_control() => write!(out, "\\u{:04x}", c as u32)?,
                c => write!(out, "{c}")?,
            }
        }
        write!(out, "\"")
    }
}

#[cfg(not(feature = "profiling"))]
mod disabled {
    use super::*;

    /// Starts recording (no-op without the `profiling` feature).
    #[inline]
    pub fn begin<P: AsRef<Path>>(_path: P) {}

    /// Writes the trace (no-op).
    #[inline]
    pub fn finish() {}

    /// Opens a span (no-op).
    #[inline]
    pub fn span(_name: impl Into<SpanName>) -> SpanGuard {
        SpanGuard
    }

    /// No-op span guard.
    pub struct SpanGuard;
}

#[cfg(feature = "profiling")]
pub use enabled::{begin, finish, span, SpanGuard};

#[cfg(not(feature = "profiling"))]
pub use disabled::{begin, finish, span, SpanGuard};
