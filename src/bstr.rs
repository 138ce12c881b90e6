use bstr::{BString, ByteSlice};
use core::cmp::Ordering;
use std::ops::{Deref, DerefMut};

/// Bstr is a convenience wrapper around binary data that adds string-like
/// functions. Header names and values are bytes, not UTF-8, so comparisons
/// and searches work on raw octets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bstr {
    // Wrap a BString under the hood. We want to be able to
    // implement behaviours on top of this if needed, so we wrap
    // it instead of exposing it directly in our public API.
    s: BString,
}

impl Default for Bstr {
    fn default() -> Self {
        Self {
            s: BString::from(Vec::new()),
        }
    }
}

impl Bstr {
    /// Make a new owned Bstr.
    pub fn new() -> Self {
        Bstr {
            s: BString::from(Vec::new()),
        }
    }

    /// Compare this bstr with the given slice.
    pub fn cmp_slice<B: AsRef<[u8]>>(&self, other: B) -> Ordering {
        self.as_slice().cmp(other.as_ref())
    }

    /// Return true if self is equal to other.
    pub fn eq_slice<B: AsRef<[u8]>>(&self, other: B) -> bool {
        self.cmp_slice(other) == Ordering::Equal
    }

    /// Compare bstr with the given slice, ignoring ascii case.
    pub fn cmp_nocase<B: AsRef<[u8]>>(&self, other: B) -> Ordering {
        let left = self.as_slice().iter().map(u8::to_ascii_lowercase);
        let right = other.as_ref().iter().map(u8::to_ascii_lowercase);
        left.cmp(right)
    }

    /// Return true if self is equal to other ignoring ascii case.
    pub fn eq_nocase<B: AsRef<[u8]>>(&self, other: B) -> bool {
        self.cmp_nocase(other) == Ordering::Equal
    }

    /// Extend this bstr with the given slice.
    pub fn add<B: AsRef<[u8]>>(&mut self, other: B) {
        self.extend_from_slice(other.as_ref())
    }

    /// Find the index of the given slice.
    pub fn index_of<B: AsRef<[u8]>>(&self, other: B) -> Option<usize> {
        self.find(other.as_ref())
    }

    /// Find the index of the given slice ignoring ascii case.
    pub fn index_of_nocase<B: AsRef<[u8]>>(&self, other: B) -> Option<usize> {
        let haystack = self.as_slice().to_ascii_lowercase();
        let needle = other.as_ref().to_ascii_lowercase();
        haystack.find(&needle)
    }
}

// Trait Implementations for Bstr

/// Let callers access BString functions.
impl Deref for Bstr {
    type Target = BString;

    fn deref(&self) -> &Self::Target {
        &self.s
    }
}

/// Let callers access mutable BString functions.
impl DerefMut for Bstr {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.s
    }
}

impl From<&[u8]> for Bstr {
    fn from(src: &[u8]) -> Self {
        Bstr {
            s: BString::from(src),
        }
    }
}

impl From<&str> for Bstr {
    fn from(src: &str) -> Self {
        src.as_bytes().into()
    }
}

impl From<Vec<u8>> for Bstr {
    fn from(src: Vec<u8>) -> Self {
        Bstr {
            s: BString::from(src),
        }
    }
}

/// Compare a Bstr to a &str byte for byte.
impl PartialEq<&str> for Bstr {
    fn eq(&self, rhs: &&str) -> bool {
        self.as_bytes() == rhs.as_bytes()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eq_nocase_matches_mixed_case() {
        let b = Bstr::from("Content-Length");
        assert!(b.eq_nocase("content-length"));
        assert!(b.eq_nocase("CONTENT-LENGTH"));
        assert!(!b.eq_nocase("content-length "));
    }

    #[test]
    fn index_of_finds_tokens() {
        let b = Bstr::from("keep-alive,upgrade");
        assert_eq!(Some(0), b.index_of("keep-alive"));
        assert_eq!(Some(11), b.index_of("upgrade"));
        assert_eq!(None, b.index_of("close"));
        assert_eq!(Some(11), b.index_of_nocase("UPGRADE"));
    }

    #[test]
    fn add_extends_in_place() {
        let mut b = Bstr::from("Content-Le");
        b.add("ngth");
        assert_eq!(b, "Content-Length");
        assert_eq!(14, b.len());
    }
}
