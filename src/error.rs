//! Allocation error type shared by every strategy.
//!
//! Runtime exhaustion is recoverable and reported as `Err` from the
//! allocation path; constructor failures are fatal for the instance being
//! built. The error carries the failed [`Layout`] when one is known so
//! callers can log or retry with a smaller request.

use core::alloc::Layout;
use core::fmt;

/// Classifies an allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocErrorKind {
    /// No region currently satisfies the request. Recoverable: freeing or
    /// resetting may make an identical request succeed.
    Exhausted,
    /// Constructor parameters cannot describe a working allocator.
    InvalidConfig,
    /// The request exceeds the largest declared pool size class.
    NoMatchingSizeClass,
    /// The requested alignment exceeds what the serving region guarantees.
    UnsupportedAlignment,
    /// The backing byte region could not be acquired from the host.
    BufferAcquisition,
}

impl AllocErrorKind {
    /// Static description of the error kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocErrorKind::Exhausted => "allocator exhausted",
            AllocErrorKind::InvalidConfig => "invalid allocator configuration",
            AllocErrorKind::NoMatchingSizeClass => "no matching size class",
            AllocErrorKind::UnsupportedAlignment => "unsupported alignment",
            AllocErrorKind::BufferAcquisition => "buffer acquisition failed",
        }
    }
}

impl fmt::Display for AllocErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by allocator constructors and allocation operations.
#[derive(Debug, Clone)]
pub struct AllocError {
    kind: AllocErrorKind,
    layout: Option<Layout>,
    message: Option<&'static str>,
}

impl AllocError {
    /// Creates an error of the given kind with no further context.
    pub const fn new(kind: AllocErrorKind) -> Self {
        Self {
            kind,
            layout: None,
            message: None,
        }
    }

    /// Exhaustion while serving `layout`.
    pub const fn exhausted(layout: Layout) -> Self {
        Self {
            kind: AllocErrorKind::Exhausted,
            layout: Some(layout),
            message: None,
        }
    }

    /// Constructor rejection with a static reason.
    pub const fn invalid_config(message: &'static str) -> Self {
        Self {
            kind: AllocErrorKind::InvalidConfig,
            layout: None,
            message: Some(message),
        }
    }

    /// Request larger than every declared size class.
    pub const fn no_matching_size_class(layout: Layout) -> Self {
        Self {
            kind: AllocErrorKind::NoMatchingSizeClass,
            layout: Some(layout),
            message: None,
        }
    }

    /// Requested alignment stricter than the serving region can provide.
    pub const fn unsupported_alignment(layout: Layout) -> Self {
        Self {
            kind: AllocErrorKind::UnsupportedAlignment,
            layout: Some(layout),
            message: None,
        }
    }

    /// The host refused the backing region described by `layout`.
    pub const fn buffer_acquisition(layout: Layout) -> Self {
        Self {
            kind: AllocErrorKind::BufferAcquisition,
            layout: Some(layout),
            message: None,
        }
    }

    /// The specific error kind.
    pub const fn kind(&self) -> AllocErrorKind {
        self.kind
    }

    /// The layout that failed, if one is attached.
    pub const fn layout(&self) -> Option<Layout> {
        self.layout
    }

    /// True for recoverable exhaustion.
    pub const fn is_exhausted(&self) -> bool {
        matches!(self.kind, AllocErrorKind::Exhausted)
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(layout) = self.layout {
            write!(
                f,
                ": {} bytes with alignment {}",
                layout.size(),
                layout.align()
            )?;
        }
        if let Some(message) = self.message {
            write!(f, " ({message})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AllocError {}

/// Result type for allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_layout() {
        let layout = Layout::from_size_align(64, 16).unwrap();
        let err = AllocError::exhausted(layout);
        let text = err.to_string();
        assert!(text.contains("exhausted"));
        assert!(text.contains("64 bytes"));
        assert!(text.contains("alignment 16"));
    }

    #[test]
    fn kind_predicates() {
        let layout = Layout::new::<u64>();
        assert!(AllocError::exhausted(layout).is_exhausted());
        assert!(!AllocError::invalid_config("zero capacity").is_exhausted());
        assert_eq!(
            AllocError::no_matching_size_class(layout).kind(),
            AllocErrorKind::NoMatchingSizeClass
        );
    }

    #[test]
    fn config_error_carries_message() {
        let err = AllocError::invalid_config("capacity must be non-zero");
        assert!(err.to_string().contains("capacity must be non-zero"));
        assert!(err.layout().is_none());
    }
}
