#![forbid(unsafe_code)]

/// A piece of generated Rust source. `body` is statement-position text;
/// `hoisted` is module-level text (generated `fn`s and struct definitions)
/// that floats to the top of the generated module regardless of where in the
/// tree it was produced.
#[derive(Clone, Debug, Default)]
pub struct Fragment {
    pub body: String,
    pub hoisted: String,
}

impl Fragment {
    pub fn body(text: impl Into<String>) -> Self {
        Self {
            body: text.into(),
            hoisted: String::new(),
        }
    }

    pub fn hoisted(text: impl Into<String>) -> Self {
        Self {
            body: String::new(),
            hoisted: text.into(),
        }
    }

    /// Structural concatenation: bodies append in statement order, hoisted
    /// parts accumulate in first-seen order.
    pub fn push(&mut self, other: Fragment) {
        self.body.push_str(&other.body);
        self.hoisted.push_str(&other.hoisted);
    }
}
