//! Pull-style input and output streams shared by both codecs.
//!
//! Errors are *sticky*: once a stream has failed, every later operation
//! returns the same error, so codec drivers can bail out at any depth and
//! the REST layer can recover one message for the response body.

/// Codec failure, carried by streams and returned by codec calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input ended mid-value.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Malformed input for the expected shape.
    #[error("{0}")]
    Syntax(String),
    /// Value does not fit the target field (width, capacity or bounds).
    #[error("{0}")]
    Overflow(String),
    /// Schema misuse or internal invariant violation.
    #[error("{0}")]
    Invalid(String),
}

impl CodecError {
    /// Shorthand for a [`CodecError::Syntax`] error.
    #[must_use]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(message.into())
    }

    /// Shorthand for an [`CodecError::Overflow`] error.
    #[must_use]
    pub fn overflow(message: impl Into<String>) -> Self {
        Self::Overflow(message.into())
    }

    /// Shorthand for a [`CodecError::Invalid`] error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

enum Sink<'a> {
    Buffer(&'a mut Vec<u8>),
    Sizing,
}

/// Byte sink with an optional *sizing* mode that counts without writing.
///
/// The binary codec sizes nested messages with a sizing stream before
/// emitting their length prefix.
pub struct OutputStream<'a> {
    sink: Sink<'a>,
    bytes_written: usize,
    error: Option<CodecError>,
}

impl<'a> OutputStream<'a> {
    /// Stream writing into `buffer`.
    #[must_use]
    pub fn buffer(buffer: &'a mut Vec<u8>) -> Self {
        Self {
            sink: Sink::Buffer(buffer),
            bytes_written: 0,
            error: None,
        }
    }

    /// Stream that counts bytes without writing them.
    #[must_use]
    pub fn sizing() -> Self {
        Self {
            sink: Sink::Sizing,
            bytes_written: 0,
            error: None,
        }
    }

    /// Total bytes written (or counted) so far.
    #[must_use]
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// True when the stream only counts bytes.
    #[must_use]
    pub fn is_sizing(&self) -> bool {
        matches!(self.sink, Sink::Sizing)
    }

    /// The sticky error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&CodecError> {
        self.error.as_ref()
    }

    /// Record `error` on the stream and return it.
    pub fn fail<T>(&mut self, error: CodecError) -> CodecResult<T> {
        if self.error.is_none() {
            self.error = Some(error.clone());
        }
        Err(self.error.clone().unwrap_or(error))
    }

    /// Write raw bytes.
    ///
    /// # Errors
    ///
    /// The sticky error, once the stream has failed.
    pub fn write(&mut self, bytes: &[u8]) -> CodecResult<()> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if let Sink::Buffer(buffer) = &mut self.sink {
            buffer.extend_from_slice(bytes);
        }
        self.bytes_written += bytes.len();
        Ok(())
    }

    /// Write a string slice.
    ///
    /// # Errors
    ///
    /// The sticky error, once the stream has failed.
    pub fn write_str(&mut self, text: &str) -> CodecResult<()> {
        self.write(text.as_bytes())
    }

    /// Write one byte.
    ///
    /// # Errors
    ///
    /// The sticky error, once the stream has failed.
    pub fn write_byte(&mut self, byte: u8) -> CodecResult<()> {
        self.write(&[byte])
    }

    /// Count `count` bytes without producing them; sizing streams only.
    pub(crate) fn count_only(&mut self, count: usize) -> CodecResult<()> {
        debug_assert!(self.is_sizing());
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        self.bytes_written += count;
        Ok(())
    }

    /// Write `bytes` base64-encoded with `=` padding.
    ///
    /// # Errors
    ///
    /// The sticky error, once the stream has failed.
    pub fn write_base64(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.write_str(&base64::encode(bytes))
    }
}

/// Pull reader over a byte slice with one-character lookahead.
///
/// The JSON decoder drives the lookahead (`peek`/`bump`); the binary
/// decoder consumes the remaining slice directly. The `field_changed` and
/// `field_nulled` flags are set by element decoders and consumed by the
/// shared field bookkeeping.
pub struct InputStream<'a> {
    data: &'a [u8],
    pos: usize,
    lookahead: Option<u8>,
    error: Option<CodecError>,
    /// Decoder signal: the last decoded element differed from the stored
    /// value.
    pub(crate) field_changed: bool,
    /// Decoder signal: the last decoded element was an explicit `null`.
    pub(crate) field_nulled: bool,
}

impl<'a> InputStream<'a> {
    /// Stream over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            lookahead: None,
            error: None,
            field_changed: false,
            field_nulled: false,
        }
    }

    /// Bytes consumed so far (including the lookahead character).
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.pos
    }

    /// The sticky error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&CodecError> {
        self.error.as_ref()
    }

    /// Record `error` on the stream and return it.
    pub fn fail<T>(&mut self, error: CodecError) -> CodecResult<T> {
        if self.error.is_none() {
            self.error = Some(error.clone());
        }
        Err(self.error.clone().unwrap_or(error))
    }

    /// Current lookahead character, filling it from the input if needed.
    /// `None` at end of input.
    pub fn peek(&mut self) -> Option<u8> {
        if self.lookahead.is_none() {
            if self.pos < self.data.len() {
                self.lookahead = Some(self.data[self.pos]);
                self.pos += 1;
            } else {
                return None;
            }
        }
        self.lookahead
    }

    /// Consume the lookahead character.
    pub fn bump(&mut self) -> Option<u8> {
        let current = self.peek();
        self.lookahead = None;
        current
    }

    /// The not-yet-consumed tail of the input. Only meaningful when the
    /// lookahead is empty (binary decoding).
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Number of unconsumed bytes.
    #[must_use]
    pub fn bytes_left(&self) -> usize {
        self.data.len() - self.pos + usize::from(self.lookahead.is_some())
    }

    /// Advance past `count` bytes of the remaining input.
    pub(crate) fn advance(&mut self, count: usize) {
        debug_assert!(self.lookahead.is_none());
        self.pos = (self.pos + count).min(self.data.len());
    }

    /// Split off a length-delimited substream; the parent position moves
    /// past it. Used by the binary codec for nested messages.
    ///
    /// # Errors
    ///
    /// [`CodecError::UnexpectedEof`] when fewer than `len` bytes remain.
    pub fn sub_stream(&mut self, len: usize) -> CodecResult<InputStream<'a>> {
        debug_assert!(self.lookahead.is_none());
        if self.bytes_left() < len {
            return self.fail(CodecError::UnexpectedEof);
        }
        let sub = InputStream::new(&self.data[self.pos..self.pos + len]);
        self.advance(len);
        Ok(sub)
    }

    /// Fold a finished substream's decoder signals back into this stream.
    pub fn absorb(&mut self, sub: &InputStream<'_>) {
        self.field_changed |= sub.field_changed;
        if self.error.is_none() {
            self.error.clone_from(&sub.error);
        }
    }

    pub(crate) fn reset_field_flags(&mut self) {
        self.field_changed = false;
        self.field_nulled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_counts_and_writes() {
        let mut buffer = Vec::new();
        let mut out = OutputStream::buffer(&mut buffer);
        out.write_str("ab").unwrap();
        out.write_byte(b'c').unwrap();
        assert_eq!(out.bytes_written(), 3);
        drop(out);
        assert_eq!(buffer, b"abc");
    }

    #[test]
    fn sizing_stream_never_stores() {
        let mut out = OutputStream::sizing();
        out.write_str("hello").unwrap();
        assert_eq!(out.bytes_written(), 5);
        assert!(out.is_sizing());
    }

    #[test]
    fn output_errors_are_sticky() {
        let mut buffer = Vec::new();
        let mut out = OutputStream::buffer(&mut buffer);
        out.write_str("x").unwrap();
        let err = out
            .fail::<()>(CodecError::invalid("boom"))
            .unwrap_err();
        assert_eq!(err, CodecError::Invalid("boom".into()));
        assert_eq!(out.write_str("y").unwrap_err(), err);
        assert_eq!(buffer, b"x");
    }

    #[test]
    fn input_lookahead_round_trip() {
        let mut input = InputStream::new(b"ab");
        assert_eq!(input.peek(), Some(b'a'));
        assert_eq!(input.peek(), Some(b'a'));
        assert_eq!(input.bump(), Some(b'a'));
        assert_eq!(input.bump(), Some(b'b'));
        assert_eq!(input.peek(), None);
        assert_eq!(input.bump(), None);
    }

    #[test]
    fn input_errors_are_sticky() {
        let mut input = InputStream::new(b"");
        let err = input.fail::<()>(CodecError::UnexpectedEof).unwrap_err();
        let err2 = input
            .fail::<()>(CodecError::syntax("other"))
            .unwrap_err();
        assert_eq!(err, err2);
    }

    #[test]
    fn sub_stream_is_bounded() {
        let mut input = InputStream::new(b"abcdef");
        let mut sub = input.sub_stream(3).unwrap();
        assert_eq!(sub.bump(), Some(b'a'));
        assert_eq!(sub.remaining(), b"bc");
        assert_eq!(input.remaining(), b"def");
        assert!(input.sub_stream(4).is_err());
    }

    #[test]
    fn base64_write() {
        let mut buffer = Vec::new();
        let mut out = OutputStream::buffer(&mut buffer);
        out.write_base64(&[1, 2, 3, 4]).unwrap();
        drop(out);
        assert_eq!(buffer, b"AQIDBA==");
    }
}
