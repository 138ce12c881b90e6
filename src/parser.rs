use crate::{
    bstr::Bstr,
    config::DEFAULT_MAX_HEADER_SIZE,
    error::{ParseError, Result},
    log::{Log, LogChannel, Logger},
    message::{Header, Headers, MessageInfo, Side},
    parsers,
    util::take_till_lf,
};
use std::{
    cell::RefCell,
    cmp::min,
    collections::VecDeque,
    mem::take,
    ops::Range,
    rc::Rc,
};

/// Enumerates parsing state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    /// Waiting for (or inside) a request line.
    RequestLine,
    /// Waiting for (or inside) a status line.
    ResponseLine,
    /// Consuming header lines until the empty line.
    Header,
    /// Expecting a chunk-size line.
    BodyChunkHead,
    /// Inside a chunk's data.
    BodyChunk,
    /// Expecting the CRLF that closes a chunk.
    BodyChunkEmptyLine,
    /// Consuming trailer lines after the zero-size chunk.
    BodyChunkTrailers,
    /// Inside a fixed Content-Length body.
    BodySized,
    /// Inside a close-delimited body.
    BodyRaw,
}

impl State {
    /// Bytes consumed in these states count against the header budget.
    fn in_header_section(self) -> bool {
        matches!(self, State::RequestLine | State::ResponseLine | State::Header)
    }
}

/// What the feed loop should do after a state handler returns.
enum Control {
    /// Keep dispatching while unconsumed bytes remain.
    Continue,
    /// Stop consuming; the remaining bytes are not ours to parse.
    Pause,
}

/// Mutable working view over the bytes of one feed call, shared between the
/// parser and its callbacks. `offset` is the next unconsumed byte and `end`
/// the exclusive bound of the region the parser owns for this call; both
/// are scratch state that does not outlive the call. Callbacks may rewrite
/// already-consumed content through [`WorkBuf::splice`], which keeps the
/// cursor consistent across length-changing edits.
#[derive(Debug, Default)]
pub struct WorkBuf {
    buf: Vec<u8>,
    offset: usize,
    end: usize,
    modified: bool,
}

impl WorkBuf {
    /// Creates a working buffer over a copy of the given fragment.
    pub fn new(data: &[u8]) -> Self {
        Self {
            buf: data.to_vec(),
            offset: 0,
            end: data.len(),
            modified: false,
        }
    }

    /// Position of the next unconsumed byte.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Exclusive bound of the parser-owned region.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.end - self.offset
    }

    /// Determine whether any unconsumed bytes remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The unconsumed bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.offset..self.end]
    }

    /// A view of an arbitrary region, typically a body fragment reported by
    /// [`MessageEvents::on_body`].
    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    /// Whether any splice has touched this buffer.
    pub fn was_modified(&self) -> bool {
        self.modified
    }

    /// All bytes, consumed and not, in their current (possibly rewritten)
    /// form.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Replaces `range` with `replacement`, shifting `offset` and `end` by
    /// the length delta so the parser's cursor stays on the same logical
    /// byte.
    ///
    /// # Panics
    ///
    /// Panics if the range extends past the consumed boundary; rewriting
    /// bytes the parser has not seen yet would desynchronize it.
    pub fn splice(&mut self, range: Range<usize>, replacement: &[u8]) {
        assert!(range.start <= range.end && range.end <= self.offset);
        let removed = range.end - range.start;
        self.buf.splice(range, replacement.iter().copied());
        self.offset = self.offset - removed + replacement.len();
        self.end = self.end - removed + replacement.len();
        self.modified = true;
    }

    fn consume(&mut self, n: usize) {
        self.offset = min(self.offset + n, self.end);
    }
}

impl From<&[u8]> for WorkBuf {
    fn from(data: &[u8]) -> Self {
        WorkBuf::new(data)
    }
}

impl From<Vec<u8>> for WorkBuf {
    fn from(data: Vec<u8>) -> Self {
        let end = data.len();
        Self {
            buf: data,
            offset: 0,
            end,
            modified: false,
        }
    }
}

/// Body-handling decision returned from the headers-complete callback.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BodyHandling {
    /// Parse the body according to the resolved framing.
    Parse,
    /// Complete the message without parsing a body.
    Skip,
    /// Complete the message and stop consuming; whatever follows belongs
    /// to another protocol.
    SkipAndPause,
}

/// Callbacks invoked synchronously, in event order, while bytes are fed to
/// a [`MessageParser`]. All methods default to no-ops so a consumer only
/// implements the events it cares about.
pub trait MessageEvents {
    /// Invoked once the header section is complete and framing is
    /// resolved. The returned decision controls whether a body is parsed.
    fn on_headers_complete(&mut self, _work: &mut WorkBuf, _info: &MessageInfo) -> BodyHandling {
        BodyHandling::Parse
    }

    /// Invoked for every body fragment, already consumed, as a
    /// `work[offset..offset + len]` view.
    fn on_body(&mut self, _work: &mut WorkBuf, _offset: usize, _len: usize) {}

    /// Invoked when trailer headers were seen, before message-complete.
    fn on_trailers(&mut self, _work: &mut WorkBuf, _trailers: &Headers) {}

    /// Invoked when the message is complete. The parser has already been
    /// prepared for a pipelined next message when this runs.
    fn on_message_complete(&mut self, _work: &mut WorkBuf) {}
}

/// Incremental parser for one direction of an HTTP/1.x byte stream.
///
/// Bytes arrive in arbitrary fragments through [`MessageParser::feed`];
/// lines that span fragments are buffered internally and no event is
/// emitted for a partial syntactic unit. After a message completes the
/// parser resets in place and parses the next pipelined message. A parse
/// error is fatal to the instance: subsequent feeds consume nothing.
pub struct MessageParser {
    side: Side,
    state: State,
    /// Partial line carried between feed calls.
    pending_line: Bstr,
    info: MessageInfo,
    is_chunked: bool,
    /// Lowercased Connection tokens accumulated across headers.
    connection: Bstr,
    /// Remaining body bytes for sized bodies and chunk payloads. None
    /// means close-delimited.
    body_bytes_left: Option<u64>,
    /// First explicitly declared Content-Length, kept apart from
    /// `body_bytes_left` so the duplicate check never compares against an
    /// implied value.
    declared_content_length: Option<u64>,
    header_size: usize,
    max_header_size: usize,
    had_error: bool,
    logger: Logger,
}

impl MessageParser {
    /// Creates a parser for the given message direction.
    pub fn new(side: Side) -> Self {
        let channel: LogChannel = Rc::new(RefCell::new(VecDeque::new()));
        Self::with_logger(side, Logger::new(&channel), DEFAULT_MAX_HEADER_SIZE)
    }

    pub(crate) fn with_logger(side: Side, logger: Logger, max_header_size: usize) -> Self {
        Self {
            side,
            state: Self::line_state(side),
            pending_line: Bstr::new(),
            info: MessageInfo::default(),
            is_chunked: false,
            connection: Bstr::new(),
            body_bytes_left: None,
            declared_content_length: None,
            header_size: 0,
            max_header_size,
            had_error: false,
            logger,
        }
    }

    fn line_state(side: Side) -> State {
        match side {
            Side::Request => State::RequestLine,
            Side::Response => State::ResponseLine,
        }
    }

    /// The direction this parser handles.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Metadata for the message currently being parsed. Reset once the
    /// message completes.
    pub fn info(&self) -> &MessageInfo {
        &self.info
    }

    /// Whether a fatal parse error has made this instance inert.
    pub fn had_error(&self) -> bool {
        self.had_error
    }

    /// Overrides the cumulative header-section byte cap.
    pub fn set_max_header_size(&mut self, limit: usize) {
        self.max_header_size = limit;
    }

    /// Drains accumulated diagnostics.
    pub fn take_logs(&mut self) -> Vec<Log> {
        self.logger.drain()
    }

    /// Feeds a fragment of the byte stream, invoking callbacks
    /// synchronously as syntactic units complete.
    ///
    /// Returns the number of bytes consumed from the working buffer, in
    /// the buffer's current coordinates (a rewriting callback that changes
    /// lengths shifts them). Inert instances consume nothing.
    pub fn feed<E: MessageEvents>(&mut self, work: &mut WorkBuf, events: &mut E) -> Result<usize> {
        if self.had_error {
            return Ok(0);
        }
        let start = work.offset();
        while work.offset() < work.end() {
            let control = match self.state {
                State::RequestLine => self.request_line(work),
                State::ResponseLine => self.response_line(work),
                State::Header => self.header(work, events),
                State::BodyChunkHead => self.body_chunk_head(work),
                State::BodyChunk => self.body_chunk(work, events),
                State::BodyChunkEmptyLine => self.body_chunk_empty_line(work),
                State::BodyChunkTrailers => self.body_chunk_trailers(work, events),
                State::BodySized => self.body_sized(work, events),
                State::BodyRaw => self.body_raw(work, events),
            };
            match control {
                Ok(Control::Continue) => {}
                Ok(Control::Pause) => break,
                Err(e) => {
                    self.had_error = true;
                    return Err(e);
                }
            }
        }
        // A rewriting callback may have shrunk the buffer below the
        // starting offset; never report negative consumption.
        Ok(work.offset().saturating_sub(start))
    }

    /// Signals end of stream. Legal while waiting for a start line (a
    /// trivial, empty message) or inside a close-delimited body, where it
    /// fires message-complete. Anywhere else the peer closed mid-message.
    pub fn finish<E: MessageEvents>(&mut self, work: &mut WorkBuf, events: &mut E) -> Result<()> {
        if self.had_error {
            return Ok(());
        }
        match self.state {
            State::RequestLine | State::ResponseLine => Ok(()),
            State::BodyRaw => {
                events.on_message_complete(work);
                Ok(())
            }
            _ => {
                htrw_error!(
                    self.logger,
                    LogCode::UNEXPECTED_EOF,
                    "stream closed in the middle of a message"
                );
                self.had_error = true;
                Err(ParseError::UnexpectedEndOfStream)
            }
        }
    }

    /// Consumes one line, buffering across feed calls when the newline has
    /// not arrived yet. A single trailing CR is stripped. Bytes consumed
    /// while in the header section count against the header budget.
    fn consume_line(&mut self, work: &mut WorkBuf) -> Result<Option<Bstr>> {
        let (len, line) = match take_till_lf(work.as_slice()) {
            Ok((_, with_lf)) => {
                let len = with_lf.len();
                let mut line = take(&mut self.pending_line);
                line.add(&with_lf[..len - 1]);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                work.consume(len);
                (len, Some(line))
            }
            Err(_) => {
                let len = work.len();
                if self.pending_line.len() + len > self.max_header_size {
                    htrw_error!(
                        self.logger,
                        LogCode::FIELD_TOO_LONG,
                        "buffered line exceeds the configured maximum"
                    );
                    return Err(ParseError::HeaderSectionTooLarge);
                }
                self.pending_line.add(work.as_slice());
                work.consume(len);
                (len, None)
            }
        };
        if self.state.in_header_section() {
            self.header_size += len;
            if self.header_size > self.max_header_size {
                htrw_error!(
                    self.logger,
                    LogCode::FIELD_TOO_LONG,
                    format!(
                        "header section size {} exceeds limit {}",
                        self.header_size, self.max_header_size
                    )
                );
                return Err(ParseError::HeaderSectionTooLarge);
            }
        }
        Ok(line)
    }

    fn request_line(&mut self, work: &mut WorkBuf) -> Result<Control> {
        let Some(line) = self.consume_line(work)? else {
            return Ok(Control::Continue);
        };
        if line.is_empty() {
            // Stray newline ahead of the request line.
            return Ok(Control::Continue);
        }
        let Ok((_, (method, target, major, minor))) = parsers::request_line(line.as_slice()) else {
            htrw_error!(
                self.logger,
                LogCode::INVALID_START_LINE,
                "request line does not match METHOD SP target SP HTTP/M.N"
            );
            return Err(ParseError::MalformedStartLine);
        };
        self.info.method = Some(Bstr::from(method));
        self.info.target = Some(Bstr::from(target));
        self.info.version_major = major;
        self.info.version_minor = minor;
        // A request has no body until a length header says otherwise.
        self.body_bytes_left = Some(0);
        self.state = State::Header;
        Ok(Control::Continue)
    }

    fn response_line(&mut self, work: &mut WorkBuf) -> Result<Control> {
        let Some(line) = self.consume_line(work)? else {
            return Ok(Control::Continue);
        };
        if line.is_empty() {
            return Ok(Control::Continue);
        }
        let Ok((_, (major, minor, code, reason))) = parsers::status_line(line.as_slice()) else {
            htrw_error!(
                self.logger,
                LogCode::INVALID_START_LINE,
                "status line does not match HTTP/M.N SP status"
            );
            return Err(ParseError::MalformedStartLine);
        };
        self.info.version_major = major;
        self.info.version_minor = minor;
        self.info.status_code = Some(code);
        self.info.status_message = Some(Bstr::from(reason));
        // Implied zero length.
        if code / 100 == 1 || code == 204 || code == 304 {
            self.body_bytes_left = Some(0);
        }
        self.state = State::Header;
        Ok(Control::Continue)
    }

    fn header<E: MessageEvents>(&mut self, work: &mut WorkBuf, events: &mut E) -> Result<Control> {
        let Some(line) = self.consume_line(work)? else {
            return Ok(Control::Continue);
        };
        if !line.is_empty() {
            self.parse_field(&line, false)?;
            return Ok(Control::Continue);
        }
        self.headers_complete(work, events)
    }

    /// Parses one header or trailer line into the message info. Lines that
    /// match neither the header nor the continuation grammar are ignored.
    fn parse_field(&mut self, line: &Bstr, trailer: bool) -> Result<()> {
        if line.contains(&b'\r') {
            htrw_error!(
                self.logger,
                LogCode::BARE_CARRIAGE_RETURN,
                "carriage return not followed by line feed"
            );
            return Err(ParseError::MalformedHeaderLine);
        }
        if let Ok((_, (name, value))) = parsers::header_line(line.as_slice()) {
            let header = Header::new(Bstr::from(name), Bstr::from(value));
            if trailer {
                self.info.trailers.push(header);
            } else {
                self.info.headers.push(header);
            }
            return Ok(());
        }
        match parsers::header_continuation(line.as_slice()) {
            Ok((_, continued)) if !continued.is_empty() => {
                let fields = if trailer {
                    &mut self.info.trailers
                } else {
                    &mut self.info.headers
                };
                if let Some(last) = fields.last_mut() {
                    if !last.value.is_empty() {
                        last.value.add(" ");
                    }
                    last.value.add(continued);
                } else {
                    htrw_warn!(
                        self.logger,
                        LogCode::CONTINUATION_WITHOUT_HEADER,
                        "continuation line with no header to continue"
                    );
                }
            }
            Ok(_) => {}
            Err(_) => {
                htrw_warn!(
                    self.logger,
                    LogCode::FIELD_MISSING_COLON,
                    "header line without a colon ignored"
                );
            }
        }
        Ok(())
    }

    /// Resolves framing from the accumulated headers, fires the
    /// headers-complete callback and moves into the body (or completes a
    /// bodyless message).
    fn headers_complete<E: MessageEvents>(
        &mut self, work: &mut WorkBuf, events: &mut E,
    ) -> Result<Control> {
        let mut has_content_length = false;
        let mut has_upgrade = false;
        for header in &self.info.headers {
            if header.name.eq_nocase("transfer-encoding") {
                self.is_chunked = header.value.eq_nocase("chunked");
            } else if header.name.eq_nocase("content-length") {
                match parsers::content_length(header.value.as_slice(), Some(&mut self.logger)) {
                    Some(value) => {
                        if has_content_length {
                            // Repeats are tolerated only when they agree with
                            // the first declared value.
                            if Some(value) != self.declared_content_length {
                                htrw_error!(
                                    self.logger,
                                    LogCode::DUPLICATE_CONTENT_LENGTH,
                                    "conflicting Content-Length headers"
                                );
                                return Err(ParseError::DuplicateContentLength);
                            }
                        } else {
                            has_content_length = true;
                            self.declared_content_length = Some(value);
                            self.body_bytes_left = Some(value);
                        }
                    }
                    None => {
                        htrw_warn!(
                            self.logger,
                            LogCode::INVALID_CONTENT_LENGTH,
                            "unparseable Content-Length value ignored"
                        );
                    }
                }
            } else if header.name.eq_nocase("connection") {
                let mut value = header.value.clone();
                value.make_ascii_lowercase();
                if !self.connection.is_empty() {
                    self.connection.add(",");
                }
                self.connection.add(value.as_slice());
            } else if header.name.eq_nocase("upgrade") {
                has_upgrade = true;
            }
        }
        // If both chunked and a fixed length were declared, chunked governs
        // the framing and the fixed length is discarded.
        if self.is_chunked && has_content_length {
            htrw_warn!(
                self.logger,
                LogCode::CHUNKED_WITH_CONTENT_LENGTH,
                "Transfer-Encoding and Content-Length both present"
            );
            self.body_bytes_left = None;
            self.declared_content_length = None;
        }
        self.info.upgrade = if has_upgrade && self.connection.index_of("upgrade").is_some() {
            // Upgrade is mandatory only on requests and 101 responses;
            // elsewhere the header is informational.
            self.side == Side::Request || self.info.status_code == Some(101)
        } else {
            self.info.method.as_ref().is_some_and(|m| m.eq_slice("CONNECT"))
        };
        self.info.keep_alive = self.should_keep_alive();

        let handling = events.on_headers_complete(work, &self.info);
        if handling == BodyHandling::SkipAndPause {
            self.next_message(work, events);
            return Ok(Control::Pause);
        }
        if self.is_chunked && handling == BodyHandling::Parse {
            self.state = State::BodyChunkHead;
        } else if handling == BodyHandling::Skip || self.body_bytes_left == Some(0) {
            let upgrade = self.info.upgrade;
            self.next_message(work, events);
            if upgrade {
                return Ok(Control::Pause);
            }
        } else if self.body_bytes_left.is_none() {
            self.state = State::BodyRaw;
        } else {
            self.state = State::BodySized;
        }
        Ok(Control::Continue)
    }

    fn should_keep_alive(&self) -> bool {
        if self.info.version_major > 0 && self.info.version_minor > 0 {
            if self.connection.index_of("close").is_some() {
                return false;
            }
        } else if self.connection.index_of("keep-alive").is_none() {
            return false;
        }
        // Without a determinable body length the connection must close to
        // delimit the body.
        self.body_bytes_left.is_some() || self.is_chunked
    }

    fn body_chunk_head(&mut self, work: &mut WorkBuf) -> Result<Control> {
        let Some(line) = self.consume_line(work)? else {
            return Ok(Control::Continue);
        };
        let (size, has_extension) = parsers::chunk_size(line.as_slice());
        if has_extension {
            htrw_warn!(
                self.logger,
                LogCode::CHUNK_EXTENSION,
                "chunk extension ignored"
            );
        }
        match size {
            Some(size) if size > 0 => {
                self.body_bytes_left = Some(size);
                self.state = State::BodyChunk;
            }
            _ => {
                if size.is_none() {
                    htrw_warn!(
                        self.logger,
                        LogCode::INVALID_CHUNK_LENGTH,
                        "unparseable chunk size treated as final chunk"
                    );
                }
                self.state = State::BodyChunkTrailers;
            }
        }
        Ok(Control::Continue)
    }

    fn body_chunk<E: MessageEvents>(&mut self, work: &mut WorkBuf, events: &mut E) -> Result<Control> {
        let remaining = self.body_bytes_left.unwrap_or(0);
        let len = min(work.len() as u64, remaining) as usize;
        let offset = work.offset();
        work.consume(len);
        events.on_body(work, offset, len);
        let remaining = remaining - len as u64;
        self.body_bytes_left = Some(remaining);
        if remaining == 0 {
            self.state = State::BodyChunkEmptyLine;
        }
        Ok(Control::Continue)
    }

    fn body_chunk_empty_line(&mut self, work: &mut WorkBuf) -> Result<Control> {
        if self.consume_line(work)?.is_some() {
            self.state = State::BodyChunkHead;
        }
        Ok(Control::Continue)
    }

    fn body_chunk_trailers<E: MessageEvents>(
        &mut self, work: &mut WorkBuf, events: &mut E,
    ) -> Result<Control> {
        let Some(line) = self.consume_line(work)? else {
            return Ok(Control::Continue);
        };
        if !line.is_empty() {
            self.parse_field(&line, true)?;
            return Ok(Control::Continue);
        }
        if !self.info.trailers.is_empty() {
            events.on_trailers(work, &self.info.trailers);
        }
        self.next_message(work, events);
        Ok(Control::Continue)
    }

    fn body_sized<E: MessageEvents>(&mut self, work: &mut WorkBuf, events: &mut E) -> Result<Control> {
        let remaining = self.body_bytes_left.unwrap_or(0);
        let len = min(work.len() as u64, remaining) as usize;
        let offset = work.offset();
        work.consume(len);
        events.on_body(work, offset, len);
        let remaining = remaining - len as u64;
        self.body_bytes_left = Some(remaining);
        if remaining == 0 {
            self.next_message(work, events);
        }
        Ok(Control::Continue)
    }

    fn body_raw<E: MessageEvents>(&mut self, work: &mut WorkBuf, events: &mut E) -> Result<Control> {
        let len = work.len();
        let offset = work.offset();
        work.consume(len);
        events.on_body(work, offset, len);
        Ok(Control::Continue)
    }

    /// Fires message-complete and resets in place so a pipelined next
    /// message parses on the same instance.
    fn next_message<E: MessageEvents>(&mut self, work: &mut WorkBuf, events: &mut E) {
        events.on_message_complete(work);
        self.state = Self::line_state(self.side);
        self.pending_line.clear();
        self.info = MessageInfo::default();
        self.is_chunked = false;
        self.connection.clear();
        self.body_bytes_left = None;
        self.declared_content_length = None;
        self.header_size = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splice_shifts_cursor_by_delta() {
        let mut work = WorkBuf::new(b"abcdef");
        work.consume(4);
        work.splice(0..4, b"XY");
        assert_eq!(2, work.offset());
        assert_eq!(4, work.end());
        assert_eq!(b"ef", work.as_slice());
        assert!(work.was_modified());
        assert_eq!(b"XYef".to_vec(), work.into_bytes());
    }

    #[test]
    fn splice_grows_buffer() {
        let mut work = WorkBuf::new(b"abc");
        work.consume(3);
        work.splice(1..2, b"BBB");
        assert_eq!(5, work.offset());
        assert_eq!(5, work.end());
        assert_eq!(b"aBBBc".to_vec(), work.into_bytes());
    }

    #[test]
    #[should_panic]
    fn splice_past_cursor_panics() {
        let mut work = WorkBuf::new(b"abcdef");
        work.consume(2);
        work.splice(0..4, b"X");
    }

    #[test]
    fn empty_splice_inserts() {
        let mut work = WorkBuf::new(b"ab");
        work.consume(2);
        work.splice(2..2, b"cd");
        assert_eq!(4, work.offset());
        assert_eq!(b"abcd".to_vec(), work.into_bytes());
    }
}
