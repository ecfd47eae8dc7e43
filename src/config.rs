/// Options for validating and rendering, passed explicitly by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    /// Report every `<<` that is not a recognised tag instead of keeping it
    /// as literal text.
    pub strict_tags: bool,
    /// What a `null` field renders as.
    pub null_text: String,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict_tags(mut self, strict: bool) -> Self {
        self.strict_tags = strict;
        self
    }

    pub fn null_text(mut self, text: impl Into<String>) -> Self {
        self.null_text = text.into();
        self
    }
}
