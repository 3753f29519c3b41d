use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("timed out loading {0}")]
    Timeout(String),
    #[error("run cancelled")]
    Cancelled,
}

impl PageError {
    /// Fatal errors end the whole run; everything else only skips one URL.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PageError::Launch(_) | PageError::Cancelled)
    }
}

/// A way of turning a URL into rendered HTML.
pub trait PageSource {
    /// Loads a listing page, scrolling `scrolls` times when the transport can.
    fn listing(&mut self, url: &str, scrolls: u32) -> Result<String, PageError>;

    fn detail(&mut self, url: &str) -> Result<String, PageError>;

    /// Prepares expensive resources before the first page load.
    fn warm_up(&mut self) -> Result<(), PageError> {
        Ok(())
    }

    fn release(&mut self) {}
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), PageError> {
        if self.is_cancelled() {
            Err(PageError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_launch_and_cancel_are_fatal() {
        assert!(PageError::Launch("no chrome".into()).is_fatal());
        assert!(PageError::Cancelled.is_fatal());
        assert!(!PageError::Timeout("https://a.example".into()).is_fatal());
        assert!(!PageError::Status {
            url: "https://a.example".into(),
            status: 404
        }
        .is_fatal());
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(token.check().is_ok());
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(PageError::Cancelled)));
    }
}
