//! Options of the method body read and write paths.

/// Read-path leniency.
///
/// # Examples
///
/// ```rust
/// use cilweave::assembly::ReaderOptions;
///
/// let options = ReaderOptions::default().with_strict_heaps(true);
/// assert!(options.raw_unknown_opcodes);
/// assert!(options.strict_heaps);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Decode unknown opcode bytes as raw instructions instead of failing
    pub raw_unknown_opcodes: bool,
    /// Fail on out-of-range heap references instead of reading the empty value
    pub strict_heaps: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            raw_unknown_opcodes: true,
            strict_heaps: false,
        }
    }
}

impl ReaderOptions {
    /// Set [`ReaderOptions::raw_unknown_opcodes`].
    #[must_use]
    pub fn with_raw_unknown_opcodes(mut self, enabled: bool) -> Self {
        self.raw_unknown_opcodes = enabled;
        self
    }

    /// Set [`ReaderOptions::strict_heaps`].
    #[must_use]
    pub fn with_strict_heaps(mut self, enabled: bool) -> Self {
        self.strict_heaps = enabled;
        self
    }
}

/// Write-path choices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Always write a fat header, even if a tiny one would do
    pub force_fat_header: bool,
    /// Rewrite long branches to their short forms where the target is in reach
    pub shorten_branches: bool,
}

impl WriterOptions {
    /// Set [`WriterOptions::force_fat_header`].
    #[must_use]
    pub fn with_force_fat_header(mut self, enabled: bool) -> Self {
        self.force_fat_header = enabled;
        self
    }

    /// Set [`WriterOptions::shorten_branches`].
    #[must_use]
    pub fn with_shorten_branches(mut self, enabled: bool) -> Self {
        self.shorten_branches = enabled;
        self
    }
}
