use crate::bstr::Bstr;

/// Default cap on cumulative header-section bytes: 80 KiB.
pub(crate) const DEFAULT_MAX_HEADER_SIZE: usize = 80 * 1024;

/// What the rewrite filter reports to the host when a message fails to
/// parse. Recovery is never attempted; this only selects the fallback.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorPolicy {
    /// Pass the original bytes through unmodified.
    PassThrough,
    /// Ask the host to close the connection.
    Close,
}

/// Configuration for parsing and rewriting.
#[derive(Clone)]
pub struct Config {
    /// The maximum number of bytes the parser will spend inside the header
    /// section of a single message, including any partial line it has to
    /// buffer between reads.
    pub(crate) max_header_size: usize,
    /// URL prefix the filter is scoped to. Transactions for any other URL
    /// are left alone entirely.
    pub(crate) target_url_prefix: Option<Bstr>,
    /// Body substitution rule: replace the first occurrence of the pattern
    /// in each body fragment with the replacement.
    pub(crate) body_substitution: Option<(Bstr, Bstr)>,
    /// Fallback behavior on parse errors.
    pub(crate) error_policy: ErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            target_url_prefix: None,
            body_substitution: None,
            error_policy: ErrorPolicy::PassThrough,
        }
    }
}

impl Config {
    /// Configures the maximum number of cumulative header-section bytes
    /// accepted for one message.
    pub fn set_max_header_size(&mut self, limit: usize) {
        self.max_header_size = limit;
    }

    /// Scopes the filter to URLs starting with the given prefix. Without a
    /// prefix every transaction is filtered.
    pub fn set_rewrite_target<B: AsRef<[u8]>>(&mut self, prefix: B) {
        self.target_url_prefix = Some(Bstr::from(prefix.as_ref()));
    }

    /// Configures the body substitution rule. The first occurrence of
    /// `pattern` in each body fragment is replaced with `replacement`.
    pub fn set_body_substitution<P: AsRef<[u8]>, R: AsRef<[u8]>>(
        &mut self, pattern: P, replacement: R,
    ) {
        self.body_substitution = Some((
            Bstr::from(pattern.as_ref()),
            Bstr::from(replacement.as_ref()),
        ));
    }

    /// Selects the fallback behavior when a message fails to parse.
    pub fn set_error_policy(&mut self, policy: ErrorPolicy) {
        self.error_policy = policy;
    }
}
