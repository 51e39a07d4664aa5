//! Model Fallback
//!
//! Tries candidate models in order. A failure only moves on to the next
//! candidate when it says the model itself is unavailable
//! ([`AgentError::should_fallback`]); anything else is returned at once.
//!
//! [`dispatch`] covers attempts that own their inputs. Callers whose attempt
//! borrows mutable state across the await (a streaming chunk sink) drive a
//! [`FallbackChain`] in their own loop instead:
//!
//! ```rust,ignore
//! let mut chain = FallbackChain::new(&models);
//! loop {
//!     let model = chain.next_model()?;
//!     match send(model, &mut *on_chunk).await {
//!         Ok(response) => return Ok(response),
//!         Err(e) => chain.record_failure(e)?,
//!     }
//! }
//! ```

use std::future::Future;

use crate::error::{AgentError, Result};

/// Position in an ordered list of candidate models
#[derive(Debug)]
pub struct FallbackChain<'a> {
    candidates: &'a [String],
    next: usize,
    last_error: Option<AgentError>,
}

impl<'a> FallbackChain<'a> {
    pub const fn new(candidates: &'a [String]) -> Self {
        Self {
            candidates,
            next: 0,
            last_error: None,
        }
    }

    /// The next model to try.
    ///
    /// Fails with the last recorded error once the list is exhausted.
    pub fn next_model(&mut self) -> Result<&'a str> {
        if let Some(model) = self.candidates.get(self.next) {
            self.next += 1;
            return Ok(model);
        }

        Err(self
            .last_error
            .take()
            .unwrap_or_else(|| AgentError::Config("no candidate models configured".into())))
    }

    /// Record a failed attempt; returns the error when it must not fall back
    pub fn record_failure(&mut self, error: AgentError) -> Result<()> {
        if !error.should_fallback() {
            return Err(error);
        }

        let failed = self.next.checked_sub(1).and_then(|i| self.candidates.get(i));
        match self.candidates.get(self.next) {
            Some(next) => tracing::warn!(
                model = failed.map_or("", String::as_str),
                next = %next,
                error = %error,
                "Model unavailable, trying next candidate"
            ),
            None => tracing::warn!(
                model = failed.map_or("", String::as_str),
                error = %error,
                "Model unavailable and no candidates left"
            ),
        }

        self.last_error = Some(error);
        Ok(())
    }
}

/// Run `attempt` against each candidate until one succeeds or a failure is final
pub async fn dispatch<T, F, Fut>(candidates: &[String], mut attempt: F) -> Result<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut chain = FallbackChain::new(candidates);
    loop {
        let model = chain.next_model()?;
        match attempt(model.to_string()).await {
            Ok(value) => return Ok(value),
            Err(e) => chain.record_failure(e)?,
        }
    }
}
