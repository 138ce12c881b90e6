use crate::{
    bstr::Bstr,
    config::{Config, ErrorPolicy},
    log::{Log, LogChannel, Logger},
    message::{MessageInfo, Side},
    parser::{BodyHandling, MessageEvents, MessageParser, WorkBuf},
    registry::Registry,
};
use bstr::ByteSlice;
use std::{cell::RefCell, collections::VecDeque, rc::Rc};
use time::OffsetDateTime;

/// Outcome of one filter invocation, in wire terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RewriteResult {
    /// Substitute these bytes for the original fragment on the wire. May
    /// be empty when the filter is holding bytes back until a syntactic
    /// unit completes.
    Rewritten(Vec<u8>),
    /// Pass the original bytes through unmodified.
    Unchanged,
    /// Close the connection.
    CloseConnection,
    /// Stop filtering this transaction entirely.
    StopFiltering,
}

/// Per-message rewrite state, layered onto the parser through its
/// callbacks. Owns the decision of how the outgoing representation differs
/// from the parsed one.
struct RewriteActions {
    side: Side,
    substitution: Option<(Bstr, Bstr)>,
    /// Whether the rewritten output uses chunked framing. Decided once at
    /// headers-complete and fixed for the message.
    output_chunked: bool,
    /// End of finalized rewritten output within the current feed's
    /// working buffer. Everything before it is ready for the wire;
    /// everything between it and the parser's cursor is source framing
    /// that will be regenerated.
    write_pos: usize,
    /// Reads seen since the current message started, for diagnostics.
    feeds_this_message: usize,
    logger: Logger,
}

impl RewriteActions {
    fn begin_feed(&mut self) {
        self.write_pos = 0;
        self.feeds_this_message += 1;
    }
}

impl MessageEvents for RewriteActions {
    fn on_headers_complete(&mut self, work: &mut WorkBuf, info: &MessageInfo) -> BodyHandling {
        if self.feeds_this_message > 1 {
            htrw_warn!(
                self.logger,
                LogCode::MULTI_PACKET_HEAD,
                "header block spanned multiple reads; rebuilt in one piece"
            );
        }
        let head = match self.side {
            Side::Request => build_request_head(info),
            Side::Response => {
                let (head, chunked) = build_response_head(info);
                self.output_chunked = chunked;
                head
            }
        };
        work.splice(self.write_pos..work.offset(), &head);
        self.write_pos = work.offset();
        match self.side {
            // Request bodies are not rewritten.
            Side::Request => BodyHandling::Skip,
            Side::Response => BodyHandling::Parse,
        }
    }

    fn on_body(&mut self, work: &mut WorkBuf, offset: usize, len: usize) {
        if len == 0 {
            return;
        }
        let mut body = work.slice(offset..offset + len).to_vec();
        if let Some((pattern, replacement)) = &self.substitution {
            substitute_once(&mut body, pattern.as_slice(), replacement.as_slice());
        }
        if self.output_chunked {
            // Re-frame under a freshly computed size. The splice starts at
            // write_pos so any original chunk-size line and inter-chunk
            // CRLF are replaced along with the fragment.
            let mut framed = format!("{:x}\r\n", body.len()).into_bytes();
            framed.extend_from_slice(&body);
            framed.extend_from_slice(b"\r\n");
            work.splice(self.write_pos..offset + len, &framed);
        } else {
            work.splice(self.write_pos..offset + len, &body);
        }
        self.write_pos = work.offset();
    }

    fn on_message_complete(&mut self, work: &mut WorkBuf) {
        if self.output_chunked {
            // Replaces the source's terminal framing (and any trailers)
            // with our own terminal marker.
            work.splice(self.write_pos..work.offset(), b"0\r\n\r\n");
            self.write_pos = work.offset();
        }
        self.output_chunked = false;
        self.feeds_this_message = usize::from(work.offset() < work.end());
    }
}

/// One direction of one transaction: a parser plus its rewrite state.
pub(crate) struct Session {
    parser: MessageParser,
    actions: RewriteActions,
}

impl Session {
    pub(crate) fn new(side: Side, cfg: &Config, logger: Logger) -> Self {
        Self {
            parser: MessageParser::with_logger(side, logger.clone(), cfg.max_header_size),
            actions: RewriteActions {
                side,
                substitution: cfg.body_substitution.clone(),
                output_chunked: false,
                write_pos: 0,
                feeds_this_message: 0,
                logger,
            },
        }
    }
}

/// Streaming rewrite filter over HTTP/1.x transactions.
///
/// The host hands every received fragment to [`RewriteFilter::filter`]
/// together with the transaction id and direction; parser instances are
/// created lazily per (id, direction) and live until
/// [`RewriteFilter::release`]. Requests get their protocol pinned to
/// HTTP/1.0 and their encoding negotiation forced to `identity`; responses
/// are re-framed as chunked so body substitutions may change lengths
/// freely.
pub struct RewriteFilter {
    cfg: Config,
    registry: Registry,
    log_channel: LogChannel,
}

impl RewriteFilter {
    /// Creates a filter with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            registry: Registry::new(),
            log_channel: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Runs one received fragment through the filter.
    ///
    /// Fragments for URLs outside the configured target yield
    /// [`RewriteResult::StopFiltering`] without engaging the parser at
    /// all. Parse errors fall back per the configured policy.
    pub fn filter(
        &mut self, side: Side, transaction_id: &str, url: &str, data: &[u8],
    ) -> RewriteResult {
        if let Some(prefix) = &self.cfg.target_url_prefix {
            if !url.as_bytes().starts_with(prefix.as_slice()) {
                return RewriteResult::StopFiltering;
            }
        }
        let policy = self.cfg.error_policy;
        let logger = Logger::new(&self.log_channel);
        let session = self
            .registry
            .get_or_create(transaction_id, side, || Session::new(side, &self.cfg, logger));
        let Session { parser, actions } = session;
        actions.begin_feed();
        let mut work = WorkBuf::new(data);
        match parser.feed(&mut work, actions) {
            Ok(_) => {
                // Hold back bytes the parser consumed but the rewrite has
                // not finalized (a partial line, an unterminated header
                // block); they are regenerated once their unit completes.
                if work.offset() > actions.write_pos {
                    work.splice(actions.write_pos..work.offset(), b"");
                }
                if work.was_modified() {
                    RewriteResult::Rewritten(work.into_bytes())
                } else {
                    RewriteResult::Unchanged
                }
            }
            Err(_) => fallback(policy),
        }
    }

    /// Signals end of stream for one direction of a transaction. For a
    /// close-delimited body this completes the message through the
    /// filter. Unknown transactions are a no-op.
    pub fn finish(&mut self, side: Side, transaction_id: &str) -> RewriteResult {
        let policy = self.cfg.error_policy;
        let Some(session) = self.registry.get_mut(transaction_id, side) else {
            return RewriteResult::Unchanged;
        };
        let Session { parser, actions } = session;
        actions.write_pos = 0;
        let mut work = WorkBuf::new(b"");
        match parser.finish(&mut work, actions) {
            Ok(()) => {
                if work.was_modified() {
                    RewriteResult::Rewritten(work.into_bytes())
                } else {
                    RewriteResult::Unchanged
                }
            }
            Err(_) => fallback(policy),
        }
    }

    /// Drops all parser state associated with the transaction id. Safe to
    /// call for unknown or already-released ids.
    pub fn release(&mut self, transaction_id: &str) {
        self.registry.release(transaction_id);
    }

    /// Number of transactions currently resident in the registry.
    pub fn resident_transactions(&self) -> usize {
        self.registry.len()
    }

    /// When the transaction was first seen and when it last received
    /// bytes. Lets the host implement its own staleness policy for
    /// releases.
    pub fn transaction_activity(
        &self, transaction_id: &str,
    ) -> Option<(OffsetDateTime, OffsetDateTime)> {
        self.registry.activity(transaction_id)
    }

    /// Drains accumulated diagnostics.
    pub fn take_logs(&mut self) -> Vec<Log> {
        self.log_channel.borrow_mut().drain(..).collect()
    }
}

fn fallback(policy: ErrorPolicy) -> RewriteResult {
    match policy {
        ErrorPolicy::PassThrough => RewriteResult::Unchanged,
        ErrorPolicy::Close => RewriteResult::CloseConnection,
    }
}

/// Replace the first occurrence of `pattern` in `data`.
// TODO: match patterns that straddle two body fragments.
fn substitute_once(data: &mut Vec<u8>, pattern: &[u8], replacement: &[u8]) {
    if pattern.is_empty() {
        return;
    }
    if let Some(pos) = data.find(pattern) {
        data.splice(pos..pos + pattern.len(), replacement.iter().copied());
    }
}

/// Rebuilds a request head, pinning the protocol to HTTP/1.0 and forcing
/// `identity` content negotiation so the response body arrives
/// uncompressed and rewritable.
fn build_request_head(info: &MessageInfo) -> Vec<u8> {
    let mut head = Vec::with_capacity(256);
    if let Some(method) = &info.method {
        head.extend_from_slice(method.as_slice());
    }
    head.push(b' ');
    if let Some(target) = &info.target {
        head.extend_from_slice(target.as_slice());
    }
    head.extend_from_slice(b" HTTP/1.0\r\n");
    for header in &info.headers {
        head.extend_from_slice(header.name.as_slice());
        head.extend_from_slice(b": ");
        if header.name.eq_nocase("content-encoding") || header.name.eq_nocase("accept-encoding") {
            head.extend_from_slice(b"identity");
        } else {
            head.extend_from_slice(header.value.as_slice());
        }
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

/// Rebuilds a response head, replacing the declared framing with
/// `Transfer-Encoding: chunked` (emitted once). Returns the head and
/// whether chunked framing was installed; a response that declared no
/// framing stays close-delimited.
fn build_response_head(info: &MessageInfo) -> (Vec<u8>, bool) {
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(b"HTTP/");
    head.push(b'0' + info.version_major);
    head.push(b'.');
    head.push(b'0' + info.version_minor);
    head.push(b' ');
    if let Some(code) = info.status_code {
        head.extend_from_slice(code.to_string().as_bytes());
    }
    if let Some(message) = &info.status_message {
        if !message.is_empty() {
            head.push(b' ');
            head.extend_from_slice(message.as_slice());
        }
    }
    head.extend_from_slice(b"\r\n");
    let mut chunked = false;
    for header in &info.headers {
        if header.name.eq_nocase("content-length") || header.name.eq_nocase("transfer-encoding") {
            if !chunked {
                head.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
                chunked = true;
            }
            continue;
        }
        head.extend_from_slice(header.name.as_slice());
        head.extend_from_slice(b": ");
        head.extend_from_slice(header.value.as_slice());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    (head, chunked)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bstr::Bstr;
    use crate::message::Header;

    fn info_with_headers(pairs: &[(&str, &str)]) -> MessageInfo {
        let mut info = MessageInfo::default();
        for (name, value) in pairs {
            info.headers
                .push(Header::new(Bstr::from(*name), Bstr::from(*value)));
        }
        info
    }

    #[test]
    fn request_head_forces_protocol_and_identity() {
        let mut info = info_with_headers(&[("Host", "example.com"), ("Accept-Encoding", "gzip")]);
        info.method = Some(Bstr::from("GET"));
        info.target = Some(Bstr::from("/robots.txt"));
        info.version_major = 1;
        info.version_minor = 1;
        let head = build_request_head(&info);
        assert_eq!(
            b"GET /robots.txt HTTP/1.0\r\nHost: example.com\r\nAccept-Encoding: identity\r\n\r\n"
                .to_vec(),
            head
        );
    }

    #[test]
    fn response_head_installs_chunked_once() {
        let mut info = info_with_headers(&[
            ("Content-Length", "9"),
            ("Transfer-Encoding", "chunked"),
            ("Server", "Apache"),
        ]);
        info.version_major = 1;
        info.version_minor = 1;
        info.status_code = Some(200);
        info.status_message = Some(Bstr::from("OK"));
        let (head, chunked) = build_response_head(&info);
        assert!(chunked);
        assert_eq!(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nServer: Apache\r\n\r\n".to_vec(),
            head
        );
    }

    #[test]
    fn response_head_without_framing_stays_close_delimited() {
        let mut info = info_with_headers(&[("Server", "Apache")]);
        info.version_major = 1;
        info.version_minor = 0;
        info.status_code = Some(200);
        info.status_message = Some(Bstr::from(""));
        let (head, chunked) = build_response_head(&info);
        assert!(!chunked);
        assert_eq!(b"HTTP/1.0 200\r\nServer: Apache\r\n\r\n".to_vec(), head);
    }

    #[test]
    fn substitute_once_replaces_first_match_only() {
        let mut data = b"Disallow: /a\nDisallow: /b".to_vec();
        substitute_once(&mut data, b"Disallow", b"Allow");
        assert_eq!(b"Allow: /a\nDisallow: /b".to_vec(), data);
    }
}
