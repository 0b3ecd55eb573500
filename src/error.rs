//! Error types for bounter-rs operations.

use std::fmt;

/// All kinds of errors this crate's counters can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A non-string key or non-integer delta was supplied.
    TypeMismatch,
    /// An argument is invalid: negative delta, non-power-of-two width, unknown variant, ...
    InvalidArgument,
    /// A counter or the exact total would exceed `u64::MAX`.
    Overflow,
    /// The operation is not implemented for this engine (e.g. `get` on a cardinality-only sketch).
    NotImplemented,
    /// A merge was attempted between peers of different variant or shape.
    IncompatibleMerge,
    /// The size_mb budget derives a zero-sized width or depth.
    BudgetTooSmall,
    /// Deserialized bytes are malformed, truncated, or fail a tag/version check.
    MalformedDeserializeData,
}

impl ErrorKind {
    /// Converts this error kind into a static string.
    pub const fn into_static(self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::Overflow => "Overflow",
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::IncompatibleMerge => "IncompatibleMerge",
            ErrorKind::BudgetTooSmall => "BudgetTooSmall",
            ErrorKind::MalformedDeserializeData => "MalformedDeserializeData",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

/// The error type returned by all fallible operations in this crate.
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Creates a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
        }
    }

    /// Attaches a key/value pair of context to this error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Sets the underlying source error.
    ///
    /// # Panics
    ///
    /// Panics if a source has already been set.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(src.into());
        self
    }

    /// Returns this error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns this error's message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

// Convenience constructors matching the taxonomy in `ErrorKind`.
impl Error {
    pub(crate) fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, msg)
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, msg)
    }

    pub(crate) fn overflow(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Overflow, msg)
    }

    pub(crate) fn not_implemented(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, msg)
    }

    pub(crate) fn incompatible_merge(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncompatibleMerge, msg)
    }

    pub(crate) fn budget_too_small(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BudgetTooSmall, msg)
    }

    pub(crate) fn deserial(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedDeserializeData, msg)
    }

    pub(crate) fn insufficient_data(msg: impl fmt::Display) -> Self {
        Self::deserial(format!("insufficient data: {msg}"))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "   {source:#}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}
