use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use natmgr::error::NatError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for daemon operations.
pub type NatmgrdResult<T> = Result<T, NatmgrdError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    /// Captures a new backtrace for an error variant.
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    /// Renders the wrapped backtrace for debugging output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the NAT manager daemon.
///
/// Wraps [`NatError`] for core errors and provides variants for
/// infrastructure errors surfaced during setup.
#[derive(Debug)]
pub enum NatmgrdError {
    /// Core event loop or store error.
    Nat(NatError),
    /// Configuration error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error.
    Io(std::io::Error, CapturedBacktrace),
}

impl NatmgrdError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            NatmgrdError::Nat(_) => "daemon error",
            NatmgrdError::Config(_, _) => "configuration error",
            NatmgrdError::Io(_, _) => "i/o error",
        }
    }

    /// Returns the backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            NatmgrdError::Nat(err) => err.backtrace(),
            NatmgrdError::Config(_, cb) => Some(&cb.0),
            NatmgrdError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any boxed source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        NatmgrdError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("natmgrd failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        // Core errors already render their detail and location inline.
        if !matches!(self, NatmgrdError::Nat(_)) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for NatmgrdError {
    /// Renders a user-focused description for terminal and log output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NatmgrdError::Nat(err) => write!(f, "{err}"),
            NatmgrdError::Config(source, _) => write!(f, "configuration error: {source}"),
            NatmgrdError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for NatmgrdError {
    /// Returns the direct cause for this error variant.
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NatmgrdError::Nat(err) => err.source(),
            NatmgrdError::Config(source, _) => Some(source.as_ref()),
            NatmgrdError::Io(source, _) => Some(source),
        }
    }
}

impl From<NatError> for NatmgrdError {
    /// Converts a core error into the daemon error variant.
    fn from(err: NatError) -> Self {
        NatmgrdError::Nat(err)
    }
}

impl From<std::io::Error> for NatmgrdError {
    /// Converts an I/O error into an I/O error variant.
    fn from(err: std::io::Error) -> Self {
        NatmgrdError::Io(err, CapturedBacktrace::capture())
    }
}
