//! Per-run cancellation tokens.
//!
//! Cancelling a run is recorded as a completion; it does not interrupt
//! generation by itself. The token lets the generation engine notice the
//! cancellation without polling the store.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a token for a newly started run
    pub fn register(&self, run_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().insert(run_id.to_owned(), token.clone());
        token
    }

    pub fn token(&self, run_id: &str) -> Option<CancellationToken> {
        self.tokens.lock().get(run_id).cloned()
    }

    /// Signal cancellation. Returns true if the run had a token.
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.tokens.lock().get(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the token once the run is terminal
    pub fn remove(&self, run_id: &str) {
        self.tokens.lock().remove(run_id);
    }

    pub fn active_count(&self) -> usize {
        self.tokens.lock().len()
    }
}
