use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Different codes used for logging.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LogCode {
    /// Default.
    UNKNOWN = 0,
    /// Request or status line does not match its grammar.
    INVALID_START_LINE,
    /// Header line contains a carriage return not followed by a line feed.
    BARE_CARRIAGE_RETURN,
    /// Header line without a colon was ignored.
    FIELD_MISSING_COLON,
    /// Header continuation line with no header to continue.
    CONTINUATION_WITHOUT_HEADER,
    /// Content-Length value could not be parsed and was ignored.
    INVALID_CONTENT_LENGTH,
    /// Content-Length value carries extra leading characters.
    CONTENT_LENGTH_EXTRA_DATA_START,
    /// Content-Length value carries extra trailing characters.
    CONTENT_LENGTH_EXTRA_DATA_END,
    /// Two Content-Length headers disagree.
    DUPLICATE_CONTENT_LENGTH,
    /// Both chunked transfer encoding and Content-Length were declared.
    CHUNKED_WITH_CONTENT_LENGTH,
    /// Chunk-size line carries an extension, which is ignored.
    CHUNK_EXTENSION,
    /// Chunk-size line could not be parsed and ends the body.
    INVALID_CHUNK_LENGTH,
    /// Buffered field or header section exceeds the configured maximum.
    FIELD_TOO_LONG,
    /// End of stream arrived in the middle of a message.
    UNEXPECTED_EOF,
    /// Header block arrived across multiple reads.
    MULTI_PACKET_HEAD,
}

/// Enumerates all log levels.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Debug)]
pub enum LogLevel {
    /// Designates fatal error.
    Error,
    /// Designates hazardous situations.
    Warning,
    /// Default log level value.
    Notice,
    /// Designates useful information.
    Info,
}

/// The sender half of a logging channel.
pub(crate) type LogChannel = Rc<RefCell<VecDeque<Log>>>;

/// Logger struct
#[derive(Clone)]
pub(crate) struct Logger {
    /// The sender half of a logging channel.
    pub(crate) sender: LogChannel,
    /// Log level used when deciding whether to store or
    /// ignore the messages issued by the parser.
    level: LogLevel,
}

impl Logger {
    /// Returns a new logger instance.
    pub(crate) fn new(sender: &LogChannel) -> Logger {
        Self {
            sender: sender.clone(),
            level: LogLevel::Notice,
        }
    }

    /// Logs a message to the logger channel.
    pub(crate) fn log(
        &mut self, _file: &str, _line: u32, level: LogLevel, code: LogCode, msg: String,
    ) {
        // Ignore messages below our log level.
        if level <= self.level {
            let mut sender = self.sender.borrow_mut();
            sender.push_back(Log::new(code, msg));
        }
    }

    /// Drains all queued log entries.
    pub(crate) fn drain(&mut self) -> Vec<Log> {
        self.sender.borrow_mut().drain(..).collect()
    }
}

/// Represents a single log entry.
#[derive(Clone, Debug)]
pub struct Log {
    /// Message code.
    pub code: LogCode,
    /// Log message string.
    pub msg: String,
}

impl Log {
    /// Returns a new Log instance.
    pub(crate) fn new(code: LogCode, msg: String) -> Log {
        Self { code, msg }
    }
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! htrw_log {
    ($logger:expr, $level:expr, $code:expr, $msg:expr) => {{
        use $crate::log::{LogCode, LogLevel};
        $logger.log(file!(), line!(), $level, $code, $msg.to_string());
    }};
}

/// Logs a message at the info level.
#[macro_export]
macro_rules! htrw_info {
    ($logger:expr, $code:expr, $msg:expr) => {
        htrw_log!($logger, LogLevel::Info, $code, $msg);
    };
}

/// Logs a message at the warning level.
#[macro_export]
macro_rules! htrw_warn {
    ($logger:expr, $code:expr, $msg:expr) => {
        htrw_log!($logger, LogLevel::Warning, $code, $msg);
    };
}

/// Logs a message at the error level.
#[macro_export]
macro_rules! htrw_error {
    ($logger:expr, $code:expr, $msg:expr) => {
        htrw_log!($logger, LogLevel::Error, $code, $msg);
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn warn_is_queued_and_drained() {
        let channel: LogChannel = Rc::new(RefCell::new(VecDeque::new()));
        let mut logger = Logger::new(&channel);
        htrw_warn!(logger, LogCode::CHUNK_EXTENSION, "chunk extension ignored");
        let logs = logger.drain();
        assert_eq!(1, logs.len());
        assert_eq!(LogCode::CHUNK_EXTENSION, logs[0].code);
        assert!(logger.drain().is_empty());
    }

    #[test]
    fn info_is_dropped_below_notice() {
        let channel: LogChannel = Rc::new(RefCell::new(VecDeque::new()));
        let mut logger = Logger::new(&channel);
        htrw_info!(logger, LogCode::UNKNOWN, "not recorded");
        assert!(logger.drain().is_empty());
    }
}
