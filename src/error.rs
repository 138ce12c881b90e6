use std::fmt;

/// Helper for nom's default error type.
pub(crate) type NomError<I> = nom::error::Error<I>;

/// Alias for the htrw Result type. Parse failures are classified by
/// [`ParseError`].
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors fatal to the current message. After one of these is returned the
/// parser instance is inert: further feeds consume nothing and report no
/// error until the host discards the instance.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ParseError {
    /// Request or status line fails its grammar.
    MalformedStartLine,
    /// A header line contains a bare carriage return not followed by a
    /// line feed.
    MalformedHeaderLine,
    /// Two Content-Length headers carry differing values.
    DuplicateContentLength,
    /// Cumulative header bytes exceed the configured maximum.
    HeaderSectionTooLarge,
    /// End of stream was signalled while mid-header or mid-body.
    UnexpectedEndOfStream,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ParseError::MalformedStartLine => "malformed request or status line",
            ParseError::MalformedHeaderLine => "bare carriage return in header line",
            ParseError::DuplicateContentLength => "conflicting Content-Length headers",
            ParseError::HeaderSectionTooLarge => "header section exceeds configured maximum",
            ParseError::UnexpectedEndOfStream => "end of stream in the middle of a message",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseError {}
