#![allow(dead_code)]
use htrw::bstr::Bstr;
use htrw::error::Result;
use htrw::message::{Headers, MessageInfo};
use htrw::parser::{BodyHandling, MessageEvents, MessageParser, WorkBuf};

/// Records every parser callback, for event-order and content assertions.
pub struct EventRecorder {
    /// Call order of callbacks.
    pub order: Vec<String>,
    /// Snapshot of message metadata at each headers-complete.
    pub infos: Vec<MessageInfo>,
    /// All body bytes, concatenated.
    pub body: Bstr,
    /// Individual body fragments as delivered.
    pub fragments: Vec<Bstr>,
    /// Trailer pairs as delivered.
    pub trailers: Vec<(Bstr, Bstr)>,
    /// Number of completed messages.
    pub completed: usize,
    /// Decision returned from headers-complete.
    pub handling: BodyHandling,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            infos: Vec::new(),
            body: Bstr::new(),
            fragments: Vec::new(),
            trailers: Vec::new(),
            completed: 0,
            handling: BodyHandling::Parse,
        }
    }
}

impl MessageEvents for EventRecorder {
    fn on_headers_complete(&mut self, _work: &mut WorkBuf, info: &MessageInfo) -> BodyHandling {
        self.order.push("headers_complete".to_string());
        self.infos.push(info.clone());
        self.handling
    }

    fn on_body(&mut self, work: &mut WorkBuf, offset: usize, len: usize) {
        self.order.push("body".to_string());
        let fragment = Bstr::from(work.slice(offset..offset + len));
        self.body.add(fragment.as_slice());
        self.fragments.push(fragment);
    }

    fn on_trailers(&mut self, _work: &mut WorkBuf, trailers: &Headers) {
        self.order.push("trailers".to_string());
        for header in trailers {
            self.trailers
                .push((header.name.clone(), header.value.clone()));
        }
    }

    fn on_message_complete(&mut self, _work: &mut WorkBuf) {
        self.order.push("message_complete".to_string());
        self.completed += 1;
    }
}

/// Feeds the whole input as a single fragment.
pub fn feed_whole(
    parser: &mut MessageParser, events: &mut EventRecorder, input: &[u8],
) -> Result<usize> {
    let mut work = WorkBuf::new(input);
    parser.feed(&mut work, events)
}

/// Feeds the input split into two fragments at the given byte boundary.
pub fn feed_split(
    parser: &mut MessageParser, events: &mut EventRecorder, input: &[u8], at: usize,
) -> Result<usize> {
    let mut first = WorkBuf::new(&input[..at]);
    let consumed_first = parser.feed(&mut first, events)?;
    let mut second = WorkBuf::new(&input[at..]);
    let consumed_second = parser.feed(&mut second, events)?;
    Ok(consumed_first + consumed_second)
}

/// Compares a recorded message's header value to an expected value.
///
/// Example usage:
/// assert_header_eq!(recorder.infos[0], "host", "www.example.com");
#[macro_export]
macro_rules! assert_header_eq {
    ($info:expr, $key:expr, $val:expr) => {{
        let header = ($info).headers.get_nocase($key).expect(
            format!(
                "expected header '{}' to exist at {}:{}:{}",
                $key,
                file!(),
                line!(),
                column!()
            )
            .as_ref(),
        );
        assert_eq!(header.value, $val);
    }};
}
