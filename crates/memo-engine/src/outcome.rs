/// Result of a write at the session boundary.
///
/// Storage failures on the write path do not abort the conversation; they
/// come back as `Degraded` with a diagnostic for the caller to show.
#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub enum WriteOutcome<T> {
    Applied(T),
    Degraded(String),
}

impl<T> WriteOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(v) => Some(v),
            Self::Degraded(_) => None,
        }
    }

    pub fn as_applied(&self) -> Option<&T> {
        match self {
            Self::Applied(v) => Some(v),
            Self::Degraded(_) => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Applied(_) => None,
            Self::Degraded(d) => Some(d),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            Self::Applied(v) => WriteOutcome::Applied(f(v)),
            Self::Degraded(d) => WriteOutcome::Degraded(d),
        }
    }
}
