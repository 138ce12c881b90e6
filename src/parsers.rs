use crate::log::Logger;
use crate::util::{is_space_or_tab, is_token, trim_ows_end};
use nom::{
    bytes::complete::{tag, take_till, take_while, take_while1, take_while_m_n},
    character::complete::digit1,
    combinator::{all_consuming, map, opt, rest},
    sequence::tuple,
    IResult,
};

/// Parsed request line pieces: method, target, major and minor version.
pub(crate) type ParsedRequestLine<'a> = (&'a [u8], &'a [u8], u8, u8);

/// Parsed status line pieces: major and minor version, status code and
/// reason phrase (possibly empty).
pub(crate) type ParsedStatusLine<'a> = (u8, u8, u16, &'a [u8]);

/// Matches a single ascii version digit.
fn version_digit(input: &[u8]) -> IResult<&[u8], u8> {
    map(
        take_while_m_n(1, 1, |c: u8| c.is_ascii_digit()),
        |d: &[u8]| d[0] - b'0',
    )(input)
}

/// Parses a request line of the form `METHOD SP target SP HTTP/M.N`. The
/// method must be a token; the target is any run of non-space octets.
pub(crate) fn request_line(input: &[u8]) -> IResult<&[u8], ParsedRequestLine> {
    map(
        all_consuming(tuple((
            take_while1(is_token),
            tag(" "),
            take_while1(|c: u8| c != b' '),
            tag(" HTTP/"),
            version_digit,
            tag("."),
            version_digit,
        ))),
        |(method, _, target, _, major, _, minor)| (method, target, major, minor),
    )(input)
}

/// Parses a status line of the form `HTTP/M.N SP DDD [SP] reason`. The
/// reason phrase may be empty.
pub(crate) fn status_line(input: &[u8]) -> IResult<&[u8], ParsedStatusLine> {
    map(
        all_consuming(tuple((
            tag("HTTP/"),
            version_digit,
            tag("."),
            version_digit,
            tag(" "),
            take_while_m_n(3, 3, |c: u8| c.is_ascii_digit()),
            opt(tag(" ")),
            rest,
        ))),
        |(_, major, _, minor, _, code, _, reason): (_, u8, _, u8, _, &[u8], _, &[u8])| {
            let code = code
                .iter()
                .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
            (major, minor, code, reason)
        },
    )(input)
}

/// Parses a header line into a (name, value) pair. The name may not contain
/// a colon, space or tab; the value has optional leading whitespace skipped
/// and trailing whitespace trimmed.
pub(crate) fn header_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    map(
        tuple((
            take_while1(|c: u8| !matches!(c, b':' | b' ' | b'\t')),
            tag(":"),
            take_while(is_space_or_tab),
            rest,
        )),
        |(name, _, _, value): (&[u8], _, _, &[u8])| (name, trim_ows_end(value)),
    )(input)
}

/// Parses a folded-header continuation line: leading whitespace followed by
/// the continued value. The returned value is end-trimmed and may be empty
/// for a whitespace-only line.
pub(crate) fn header_continuation(input: &[u8]) -> IResult<&[u8], &[u8]> {
    map(
        tuple((take_while1(is_space_or_tab), rest)),
        |(_, value): (_, &[u8])| trim_ows_end(value),
    )(input)
}

/// Parses a chunk-size line: optional leading whitespace, hexadecimal
/// digits, and an optional `;extension` tail.
///
/// Returns the size (None when the line carries no parseable size, which
/// the caller treats as a terminal chunk) and whether an extension was
/// present.
pub(crate) fn chunk_size(input: &[u8]) -> (Option<u64>, bool) {
    let start = input
        .iter()
        .position(|c| !is_space_or_tab(*c))
        .unwrap_or(input.len());
    let data = &input[start..];
    let digits_len = data
        .iter()
        .position(|c| !c.is_ascii_hexdigit())
        .unwrap_or(data.len());
    let (digits, trailing) = data.split_at(digits_len);
    let has_extension = trailing.contains(&b';');
    if digits.is_empty() {
        return (None, has_extension);
    }
    let size = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| u64::from_str_radix(s, 16).ok());
    (size, has_extension)
}

/// Searches for and extracts the next run of ascii digits from the input,
/// parsing over leading and trailing whitespace.
///
/// Returns (trailing data, (leading non-digit data, digits)).
fn ascii_digits(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    map(
        tuple((
            take_while(is_space_or_tab),
            take_till(|c: u8| c.is_ascii_digit()),
            digit1,
            take_while(is_space_or_tab),
        )),
        |(_, leading, digits, _)| (leading, digits),
    )(input)
}

/// Parses a Content-Length value (positive decimal number). White space is
/// allowed before and after the number; any other surrounding junk is
/// warned about but the digits are still used.
///
/// Returns the length, or None if the value holds no parseable number.
pub(crate) fn content_length(input: &[u8], logger: Option<&mut Logger>) -> Option<u64> {
    let (trailing_data, (leading_data, digits)) = ascii_digits(input).ok()?;
    if let Some(logger) = logger {
        if !leading_data.is_empty() {
            htrw_warn!(
                logger,
                LogCode::CONTENT_LENGTH_EXTRA_DATA_START,
                "Content-Length value with extra data in the beginning"
            );
        }
        if !trailing_data.is_empty() {
            htrw_warn!(
                logger,
                LogCode::CONTENT_LENGTH_EXTRA_DATA_END,
                "Content-Length value with extra data in the end"
            );
        }
    }
    std::str::from_utf8(digits).ok()?.parse::<u64>().ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"GET / HTTP/1.1", b"GET", b"/", 1, 1)]
    #[case(b"POST /a/b?c=d HTTP/1.0", b"POST", b"/a/b?c=d", 1, 0)]
    #[case(b"M-SEARCH * HTTP/1.1", b"M-SEARCH", b"*", 1, 1)]
    fn test_request_line(
        #[case] input: &[u8],
        #[case] method: &[u8],
        #[case] target: &[u8],
        #[case] major: u8,
        #[case] minor: u8,
    ) {
        let (_, parsed) = request_line(input).unwrap();
        assert_eq!(parsed, (method, target, major, minor));
    }

    #[rstest]
    #[case(b"GET / HTTP/1.1 extra")]
    #[case(b"GET  / HTTP/1.1")]
    #[case(b"GET / HTTP/11")]
    #[case(b"GET / FTP/1.1")]
    #[case(b"/ HTTP/1.1")]
    fn test_request_line_invalid(#[case] input: &[u8]) {
        assert!(request_line(input).is_err());
    }

    #[rstest]
    #[case(b"HTTP/1.1 200 OK", 1, 1, 200, b"OK")]
    #[case(b"HTTP/1.0 404 Not Found", 1, 0, 404, b"Not Found")]
    #[case(b"HTTP/1.1 204", 1, 1, 204, b"")]
    #[case(b"HTTP/1.1 2000", 1, 1, 200, b"0")]
    fn test_status_line(
        #[case] input: &[u8],
        #[case] major: u8,
        #[case] minor: u8,
        #[case] code: u16,
        #[case] reason: &[u8],
    ) {
        let (_, parsed) = status_line(input).unwrap();
        assert_eq!(parsed, (major, minor, code, reason));
    }

    #[rstest]
    #[case(b"HTTP/1.1 99 Too Short")]
    #[case(b"HTTP/1.1")]
    #[case(b"ICY 200 OK")]
    fn test_status_line_invalid(#[case] input: &[u8]) {
        assert!(status_line(input).is_err());
    }

    #[rstest]
    #[case(b"Host: example.com", b"Host", b"example.com")]
    #[case(b"Host:example.com", b"Host", b"example.com")]
    #[case(b"Host:   \texample.com  ", b"Host", b"example.com")]
    #[case(b"Empty-Value:", b"Empty-Value", b"")]
    fn test_header_line(#[case] input: &[u8], #[case] name: &[u8], #[case] value: &[u8]) {
        let (_, parsed) = header_line(input).unwrap();
        assert_eq!(parsed, (name, value));
    }

    #[rstest]
    #[case(b": no name")]
    #[case(b"no colon")]
    #[case(b" leading: space")]
    fn test_header_line_invalid(#[case] input: &[u8]) {
        assert!(header_line(input).is_err());
    }

    #[rstest]
    #[case(b"  continued", b"continued")]
    #[case(b"\tcontinued value  ", b"continued value")]
    #[case(b"   ", b"")]
    fn test_header_continuation(#[case] input: &[u8], #[case] value: &[u8]) {
        let (_, parsed) = header_continuation(input).unwrap();
        assert_eq!(parsed, value);
    }

    #[rstest]
    #[case(b"12a5", (Some(0x12a5), false))]
    #[case(b"12a5;ext=value", (Some(0x12a5), true))]
    #[case(b"  \t12a5  ", (Some(0x12a5), false))]
    #[case(b"0", (Some(0), false))]
    #[case(b"", (None, false))]
    #[case(b"zz", (None, false))]
    fn test_chunk_size(#[case] input: &[u8], #[case] expected: (Option<u64>, bool)) {
        assert_eq!(chunk_size(input), expected);
    }

    #[rstest]
    #[case(b"134", Some(134))]
    #[case(b"  \t134  ", Some(134))]
    #[case(b"abcd134", Some(134))]
    #[case(b"abcd", None)]
    #[case(b"", None)]
    fn test_content_length(#[case] input: &[u8], #[case] expected: Option<u64>) {
        assert_eq!(content_length(input, None), expected);
    }
}
