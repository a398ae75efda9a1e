//! Error types and result definitions for NAT manager operations.
//!
//! Provides an error system with classification, aggregation, and captured
//! diagnostic metadata for daemon operations. The [`NatError`] type supports
//! single errors, errors with additional detail, and multiple aggregated
//! errors for compound failure scenarios.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for NAT manager operations using [`NatError`] as the error type.
///
/// This type alias reduces boilerplate when working with fallible daemon
/// operations. Most functions in this crate return this type.
pub type NatResult<T> = Result<T, NatError>;

/// Detailed payload stored for single [`NatError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

impl ErrorPayload {
    /// Creates a new payload with optional dynamic detail.
    fn new(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
        location: &'static Location<'static>,
        backtrace: Arc<Backtrace>,
    ) -> Self {
        Self {
            kind,
            description,
            detail,
            source,
            location,
            backtrace,
        }
    }
}

/// Main error type for NAT manager operations.
///
/// [`NatError`] can represent single errors, errors with additional detail,
/// or multiple aggregated errors. The design allows for rich error
/// information while maintaining ergonomic usage patterns.
#[derive(Debug, Clone)]
pub struct NatError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
///
/// This enum supports different error patterns while maintaining a unified
/// interface. Users should not interact with this type directly but use
/// [`NatError`] methods instead.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    ///
    /// This variant is mainly useful to capture several independent failures
    /// at once, for example when more than one cleanup step fails.
    Many {
        errors: Vec<NatError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during NAT manager operations.
///
/// This enum provides granular error classification to enable appropriate
/// error handling strategies. Error kinds are organized by functional area
/// and failure mode.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Store Connection Errors
    StoreConnectionFailed,

    // Store Subscription Errors
    SubscriptionFailed,
    SubscriptionLost,

    // System Command Errors
    CommandFailed,

    // Peer Notification Errors
    NotifyFailed,

    // Startup Errors
    SignalSetupFailed,
    ConfigError,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // General Store Errors
    StoreError,

    // Unknown / Uncategorized
    Unknown,
}

impl NatError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    ///
    /// For single errors, returns a vector with one element. For multiple
    /// errors, returns a flattened vector of all error kinds.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has
    /// one. Returns [`None`] if no detailed information is available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => {
                // For multiple errors, return the detail of the first error that has one.
                errors.iter().find_map(|e| e.detail())
            }
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// The stored source is preserved across clones and exposed via
    /// [`error::Error::source`]. Has no effect when called on aggregated
    /// errors because aggregates forward the first contained error as their
    /// source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.set_source(Some(Arc::new(source)));
        self
    }

    /// Creates a [`NatError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        NatError {
            repr: ErrorRepr::Single(ErrorPayload::new(
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            )),
        }
    }

    /// Sets the source for this [`NatError`].
    fn set_source(&mut self, source: Option<Arc<dyn error::Error + Send + Sync>>) {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = source;
        }
    }
}

impl PartialEq for NatError {
    fn eq(&self, other: &NatError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for NatError {
    /// Hashes the error using only its stable identifying components.
    ///
    /// Only hashes the error kind and static description, intentionally excluding:
    /// - Location information (file, line, column)
    /// - Detail field (often contains dynamic data like table names or keys)
    /// - Source errors
    /// - Backtrace
    ///
    /// This ensures that errors of the same category produce the same hash,
    /// enabling stable grouping and deduplication across multiple occurrences.
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                // Hash the discriminant to distinguish from Many variant.
                std::mem::discriminant(&self.repr).hash(state);
                // Hash only the stable components.
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                // Hash the discriminant to distinguish from Single variant.
                std::mem::discriminant(&self.repr).hash(state);
                // Hash the number of errors for differentiation.
                errors.len().hash(state);
                // Hash all errors in the aggregation.
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for NatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f, 1)?;
                write_backtrace(payload.backtrace.as_ref(), f, 1)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                } else {
                    for (index, error) in errors.iter().enumerate() {
                        let rendered = format!("{error}");
                        let mut lines = rendered.lines();
                        if let Some(first_line) = lines.next() {
                            write!(f, "\n  {}. {}", index + 1, first_line)?;
                        } else {
                            write!(f, "\n  {}.", index + 1)?;
                        }

                        for line in lines {
                            if line.is_empty() {
                                write!(f, "\n     ")?;
                            } else {
                                write!(f, "\n     {line}")?;
                            }
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for NatError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // For aggregated errors, we forward the first contained error as the source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes the captured backtrace with indentation.
fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                if line.trim().is_empty() {
                    write!(f, "\n{indent_str}  ")?;
                } else {
                    write!(f, "\n{indent_str}  {line}")?;
                }
            }
        }
    }

    Ok(())
}

/// Creates a [`NatError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for NatError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> NatError {
        NatError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`NatError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for NatError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> NatError {
        NatError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`NatError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly
/// without wrapping it in an aggregate.
impl<E> From<Vec<E>> for NatError
where
    E: Into<NatError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> NatError {
        let location = Location::caller();

        let mut errors: Vec<NatError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        NatError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`NatError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for NatError {
    #[track_caller]
    fn from(err: std::io::Error) -> NatError {
        let detail = err.to_string();
        let source = Arc::new(err);
        NatError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`NatError`] with the appropriate error kind.
///
/// Maps to [`ErrorKind::SerializationError`] for serialization failures and
/// [`ErrorKind::DeserializationError`] for deserialization failures based on
/// error classification.
impl From<serde_json::Error> for NatError {
    #[track_caller]
    fn from(err: serde_json::Error) -> NatError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax | serde_json::error::Category::Data => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
            serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        NatError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`fred::error::Error`] to [`NatError`] with the appropriate error kind.
///
/// Maps errors based on the client-reported failure category to provide
/// granular classification for better error handling around the state store.
impl From<fred::error::Error> for NatError {
    #[track_caller]
    fn from(err: fred::error::Error) -> NatError {
        use fred::error::ErrorKind as FredErrorKind;

        let (kind, description) = match err.kind() {
            FredErrorKind::Auth => (
                ErrorKind::StoreConnectionFailed,
                "State store authentication failed",
            ),
            FredErrorKind::IO => (
                ErrorKind::StoreConnectionFailed,
                "State store I/O operation failed",
            ),
            FredErrorKind::Timeout => (
                ErrorKind::StoreConnectionFailed,
                "State store command timed out",
            ),
            FredErrorKind::Canceled => {
                (ErrorKind::StoreError, "State store command canceled")
            }
            FredErrorKind::Config | FredErrorKind::Url => (
                ErrorKind::ConfigError,
                "State store configuration is invalid",
            ),
            FredErrorKind::Parse | FredErrorKind::Protocol => (
                ErrorKind::DeserializationError,
                "State store protocol error",
            ),
            _ => (ErrorKind::StoreError, "State store operation failed"),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        NatError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::nat_error;

    #[test]
    fn test_single_error_exposes_kind_and_detail() {
        let error = nat_error!(
            ErrorKind::CommandFailed,
            "Command exited with a failure status",
            "iptables -t nat -F"
        );

        assert_eq!(error.kind(), ErrorKind::CommandFailed);
        assert_eq!(error.detail(), Some("iptables -t nat -F"));
    }

    #[test]
    fn test_aggregation_of_single_error_unwraps_it() {
        let error = NatError::from(vec![nat_error!(
            ErrorKind::NotifyFailed,
            "Failed to publish the cleanup notification"
        )]);

        assert_eq!(error.kind(), ErrorKind::NotifyFailed);
        assert_eq!(error.kinds(), vec![ErrorKind::NotifyFailed]);
    }

    #[test]
    fn test_aggregated_errors_flatten_kinds() {
        let error = NatError::from(vec![
            nat_error!(ErrorKind::CommandFailed, "Command exited with a failure status"),
            nat_error!(ErrorKind::NotifyFailed, "Failed to publish the cleanup notification"),
        ]);

        assert_eq!(error.kind(), ErrorKind::CommandFailed);
        assert_eq!(
            error.kinds(),
            vec![ErrorKind::CommandFailed, ErrorKind::NotifyFailed]
        );
    }

    #[test]
    fn test_errors_compare_by_kind() {
        let a = nat_error!(ErrorKind::StoreError, "State store operation failed");
        let b = nat_error!(ErrorKind::StoreError, "Another store failure");

        assert_eq!(a, b);
    }
}
