//! Utility functions for http parsing.

use crate::error::NomError;
use nom::bytes::streaming::take_till as streaming_take_till;
use nom::IResult;

/// Determines if character is a separator.
/// separators = "(" | ")" | "<" | ">" | "@"
/// | "," | ";" | ":" | "\" | <">
/// | "/" | "[" | "]" | "?" | "="
/// | "{" | "}" | SP | HT
fn is_separator(c: u8) -> bool {
    matches!(
        c as char,
        '(' | ')'
            | '<'
            | '>'
            | '@'
            | ','
            | ';'
            | ':'
            | '\\'
            | '"'
            | '/'
            | '['
            | ']'
            | '?'
            | '='
            | '{'
            | '}'
            | ' '
            | '\t'
    )
}

/// Determines if character is a token.
/// token = 1*<any CHAR except CTLs or separators>
/// CHAR  = <any US-ASCII character (octets 0 - 127)>
pub(crate) fn is_token(c: u8) -> bool {
    (32..=126).contains(&c) && !is_separator(c)
}

/// Determines if character is optional whitespace inside a header line.
pub(crate) fn is_space_or_tab(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

/// Trim trailing spaces and tabs from the given slice.
pub(crate) fn trim_ows_end(mut data: &[u8]) -> &[u8] {
    while let Some(last) = data.last() {
        if is_space_or_tab(*last) {
            data = &data[..data.len() - 1];
        } else {
            break;
        }
    }
    data
}

/// Returns all data up to and including the first new line.
/// Returns Err if not found.
pub(crate) fn take_till_lf(data: &[u8]) -> IResult<&[u8], &[u8]> {
    let (_, line) = streaming_take_till::<_, _, NomError<&[u8]>>(|c| c == b'\n')(data)?;
    Ok((&data[line.len() + 1..], &data[0..line.len() + 1]))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn take_till_lf_splits_on_newline() {
        let (remaining, line) = take_till_lf(b"foo\r\nbar").unwrap();
        assert_eq!(b"foo\r\n", line);
        assert_eq!(b"bar", remaining);
    }

    #[test]
    fn take_till_lf_is_incomplete_without_newline() {
        assert!(take_till_lf(b"foo").is_err());
    }

    #[test]
    fn token_chars() {
        assert!(is_token(b'G'));
        assert!(is_token(b'-'));
        assert!(!is_token(b' '));
        assert!(!is_token(b'/'));
        assert!(!is_token(b':'));
    }

    #[test]
    fn trims_trailing_whitespace_only() {
        assert_eq!(b"a b".as_ref(), trim_ows_end(b"a b \t "));
        assert_eq!(b"".as_ref(), trim_ows_end(b"  "));
    }
}
