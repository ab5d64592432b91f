use serde::Deserialize;

/// Default traversal budget: large enough that no legitimate trace hits it.
pub const DEFAULT_TRAVERSAL_LIMIT_IN_WORDS: u64 = 1 << 63;

pub const DEFAULT_NESTING_LIMIT: u32 = 64;

/// Safety bounds applied while decoding each frame.
///
/// Can be deserialized from JSON; missing fields take their defaults:
///
/// ```
/// let opts: stgen_trace::ReaderOptions =
///     serde_json::from_str(r#"{"traversal_limit_in_words": 1048576}"#).unwrap();
/// assert_eq!(opts.traversal_limit_in_words, 1 << 20);
/// assert_eq!(opts.nesting_limit, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Upper bound, in 8-byte words, on the data visited while decoding a
    /// single frame. Also caps the size of the frame itself.
    pub traversal_limit_in_words: u64,

    /// Maximum pointer depth followed from the frame root.
    pub nesting_limit: u32,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            traversal_limit_in_words: DEFAULT_TRAVERSAL_LIMIT_IN_WORDS,
            nesting_limit: DEFAULT_NESTING_LIMIT,
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traversal_limit_in_words(mut self, limit: u64) -> Self {
        self.traversal_limit_in_words = limit;
        self
    }

    pub fn nesting_limit(mut self, limit: u32) -> Self {
        self.nesting_limit = limit;
        self
    }
}
