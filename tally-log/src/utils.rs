use std::error::Error;
use std::fmt;

/// Displays an error followed by its chain of sources, one `caused by:` line each.
///
/// ```
/// use tally_log::LogError;
///
/// let error = "x".parse::<u8>().unwrap_err();
/// tally_log::warn!("dropping payload: {}", LogError(&error));
/// ```
pub struct LogError<'a, E: Error + ?Sized>(pub &'a E);

impl<E: Error + ?Sized> fmt::Display for LogError<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0, f)?;
        let mut cause = self.0.source();
        while let Some(current) = cause {
            write!(f, "\n  caused by: {current}")?;
            cause = current.source();
        }
        Ok(())
    }
}

/// Reports an error through the logger, or on stderr when no subscriber accepts errors.
///
/// Meant for startup failures such as an unreadable config file, which happen before
/// [`init`](crate::init) installs a subscriber.
#[allow(clippy::print_stderr)]
pub fn ensure_error<E: AsRef<dyn Error>>(error: E) {
    let error = LogError(error.as_ref());
    if tracing::event_enabled!(tracing::Level::ERROR) {
        tracing::error!("{error}");
    } else {
        eprintln!("error: {error}");
    }
}
