//! Correlation of framed responses back to the requests that caused them.
//!
//! Each logical request is assigned a strictly increasing decimal key. The
//! key is embedded in the request's execute-marker line, echoed back by the
//! tool in the `{ready<key>}` delimiter, and used here to route the framed
//! response text to the one caller awaiting it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::{Error, Result};

/// Owns the key counter and the table of in-flight requests.
///
/// The table is touched from two contexts: the write path inserts entries
/// while requests are admitted, and the stdout/stderr pump removes entries as
/// responses and errors arrive. A plain mutex guards it; entries are never
/// visible half-constructed.
pub struct RequestCorrelator {
    next_key: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<Result<String>>>>,
}

impl RequestCorrelator {
    /// Create an empty correlator. The first minted key is `"1"`.
    pub fn new() -> Self {
        Self {
            next_key: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Mint the next key as a decimal string.
    pub fn mint_key(&self) -> String {
        (self.next_key.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Register a pending request under `key` and return the receiver that
    /// will resolve with its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if the key is already pending. Keys
    /// are strictly increasing so this cannot happen in normal operation;
    /// the caller must not write anything to the process when it does.
    pub fn register(&self, key: &str) -> Result<oneshot::Receiver<Result<String>>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.contains_key(key) {
            return Err(Error::DuplicateKey {
                key: key.to_string(),
            });
        }
        pending.insert(key.to_string(), tx);
        Ok(rx)
    }

    /// Resolve the request registered under `key` with the framed response
    /// text. Returns `false` if no such entry exists; an unknown key is a
    /// stray or already-flushed response and is silently dropped.
    pub fn resolve(&self, key: &str, text: String) -> bool {
        let sender = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(key)
        };
        match sender {
            Some(tx) => {
                // The receiver may already have been dropped by a cancelled
                // caller; the late response is simply unobserved.
                let _ = tx.send(Ok(text));
                true
            }
            None => false,
        }
    }

    /// Remove a pending entry without resolving it. Only used when the write
    /// that was supposed to trigger the response failed before reaching the
    /// process, so no response can ever arrive for the key.
    pub fn discard(&self, key: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(key);
    }

    /// Drain the whole table, resolving every entry with an error built by
    /// `make_error`. Used when the error channel fires (the error is not
    /// correlated to a key, so everything currently in flight is suspect)
    /// and when the process exits with requests outstanding.
    pub fn fail_all_with(&self, make_error: impl Fn() -> Error) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(make_error()));
        }
    }

    /// Drain the table resolving every entry as cancelled. Disposal-time
    /// flush: no request is ever left hanging.
    pub fn cancel_all(&self) {
        self.fail_all_with(|| Error::Cancelled);
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
