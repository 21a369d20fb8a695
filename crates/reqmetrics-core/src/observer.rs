//! Response capture.
//!
//! `ResponseObserver` decorates any `ResponseSink` and records what the
//! downstream handler did to it: the first status code, whether a header has
//! gone out, and how many body bytes the sink accepted. Every call is still
//! forwarded, so the observer never changes what the client receives.

use std::io;
use std::ops::{Deref, DerefMut};

use bytes::{Bytes, BytesMut};

/// Status recorded when a body is written without an explicit status.
pub const IMPLICIT_STATUS: u16 = 200;

/// Minimal response surface a handler writes to.
pub trait ResponseSink {
    /// Set the response status code.
    fn set_status(&mut self, code: u16);

    /// Write body bytes. Returns the number of bytes accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Add a response header. Sinks without header support ignore it.
    fn set_header(&mut self, _name: &str, _value: &str) {}

    /// Write the whole buffer, retrying short writes.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "sink accepted zero bytes",
                    ))
                }
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for &mut S {
    fn set_status(&mut self, code: u16) {
        (**self).set_status(code)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn set_header(&mut self, name: &str, value: &str) {
        (**self).set_header(name, value)
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for Box<S> {
    fn set_status(&mut self, code: u16) {
        (**self).set_status(code)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn set_header(&mut self, name: &str, value: &str) {
        (**self).set_header(name, value)
    }
}

/// Snapshot of what a handler did to its sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapturedResponse {
    /// First status set (explicitly or implied by a write). `None` if the
    /// handler touched neither.
    pub status: Option<u16>,
    /// Whether a status has been forwarded to the sink.
    pub header_sent: bool,
    /// Total bytes the sink accepted.
    pub bytes_written: u64,
}

/// Transparent decorator that records the status and byte count.
///
/// Owned by exactly one request. `Deref`/`DerefMut` expose the wrapped sink so
/// transport-specific operations stay reachable.
#[derive(Debug)]
pub struct ResponseObserver<S> {
    inner: S,
    captured: CapturedResponse,
}

impl<S> ResponseObserver<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            captured: CapturedResponse::default(),
        }
    }

    /// First status seen, if any.
    pub fn status(&self) -> Option<u16> {
        self.captured.status
    }

    pub fn header_sent(&self) -> bool {
        self.captured.header_sent
    }

    pub fn bytes_written(&self) -> u64 {
        self.captured.bytes_written
    }

    pub fn captured(&self) -> CapturedResponse {
        self.captured
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> Deref for ResponseObserver<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.inner
    }
}

impl<S> DerefMut for ResponseObserver<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: ResponseSink> ResponseSink for ResponseObserver<S> {
    fn set_status(&mut self, code: u16) {
        // Only the first code is recorded; repeats are still forwarded and
        // the sink decides what to do with them.
        if self.captured.status.is_none() {
            self.captured.status = Some(code);
        }
        self.captured.header_sent = true;
        self.inner.set_status(code);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.captured.header_sent {
            self.set_status(IMPLICIT_STATUS);
        }
        let n = self.inner.write(buf)?;
        self.captured.bytes_written += n as u64;
        Ok(n)
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.inner.set_header(name, value);
    }
}

/// In-memory sink with "headers already sent" semantics.
///
/// The first status wins; later calls are ignored like a real transport
/// would. Headers can be added until the status is committed.
#[derive(Debug, Default)]
pub struct BufferedSink {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: BytesMut,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Split into committed status, headers and body.
    pub fn into_parts(self) -> (Option<u16>, Vec<(String, String)>, Bytes) {
        (self.status, self.headers, self.body.freeze())
    }
}

impl ResponseSink for BufferedSink {
    fn set_status(&mut self, code: u16) {
        if let Some(prev) = self.status {
            tracing::debug!(prev, code, "superfluous set_status call");
            return;
        }
        self.status = Some(code);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(IMPLICIT_STATUS);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if self.status.is_some() {
            tracing::debug!(header = name, "header set after status was sent; ignored");
            return;
        }
        self.headers.push((name.to_string(), value.to_string()));
    }
}
