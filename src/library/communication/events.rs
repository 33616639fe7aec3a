//! Pluggable reporting of transport level events
//!
//! Connectors and acceptors report noteworthy conditions (failed connection attempts,
//! idle sessions, undeliverable messages) to a [`SystemEventListener`] in addition to
//! returning errors to their callers. The default [`LogEventListener`] forwards
//! everything to the [`log`] facade.

use std::error::Error;

/// Receiver of informational, debug and exception events
pub trait SystemEventListener: Send + Sync {
    /// Noteworthy but expected condition
    fn info(&self, message: &str);

    /// Detailed progress information
    fn debug(&self, message: &str);

    /// Failure which has been handled (or surfaced to a caller) but should not go unnoticed
    fn exception(&self, message: &str, error: &(dyn Error + 'static));
}

/// [`SystemEventListener`] which writes to the [`log`] facade
#[derive(Debug, Clone, Default)]
pub struct LogEventListener {
    context: Option<String>,
}

impl LogEventListener {
    /// Creates a listener which prefixes every line with the given context (e.g. a connector name)
    pub fn with_context(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
        }
    }

    fn prefix(&self) -> &str {
        self.context.as_deref().unwrap_or("grid")
    }
}

impl SystemEventListener for LogEventListener {
    fn info(&self, message: &str) {
        log::info!("[{}] {}", self.prefix(), message);
    }

    fn debug(&self, message: &str) {
        log::debug!("[{}] {}", self.prefix(), message);
    }

    fn exception(&self, message: &str, error: &(dyn Error + 'static)) {
        let mut chain = error.to_string();
        let mut source = error.source();

        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }

        log::error!("[{}] {}: {}", self.prefix(), message, chain);
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Listener collecting every event for later inspection
    #[derive(Default)]
    pub struct RecordingListener {
        pub infos: Mutex<Vec<String>>,
        pub debugs: Mutex<Vec<String>>,
        pub exceptions: Mutex<Vec<String>>,
    }

    impl SystemEventListener for RecordingListener {
        fn info(&self, message: &str) {
            self.infos.lock().unwrap().push(message.to_string());
        }

        fn debug(&self, message: &str) {
            self.debugs.lock().unwrap().push(message.to_string());
        }

        fn exception(&self, message: &str, error: &(dyn Error + 'static)) {
            self.exceptions
                .lock()
                .unwrap()
                .push(format!("{}: {}", message, error));
        }
    }
}
