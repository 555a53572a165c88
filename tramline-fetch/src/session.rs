//! Session cookie tracking.
//!
//! A client tracks at most one cookie, identified by its configured name.
//! Successful responses may refresh it; every request replays it. There is
//! no expiry handling: a stale session surfaces as a session-expired page
//! and the caller decides what to do.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

// ============================================================================
// Session Cookie
// ============================================================================

/// A cookie captured from a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value, exactly as sent.
    pub value: String,
    /// The full `Set-Cookie` line, attributes included.
    pub raw: String,
    /// When the cookie was captured.
    pub observed_at: DateTime<Utc>,
}

impl SessionCookie {
    /// Parses the `name=value` pair at the start of a `Set-Cookie` line.
    ///
    /// Attributes (`Path`, `Expires`, ...) are kept in [`raw`](Self::raw)
    /// but otherwise ignored.
    pub fn parse(set_cookie: &str) -> Option<Self> {
        let pair = set_cookie.split(';').next()?;
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            raw: set_cookie.to_string(),
            observed_at: Utc::now(),
        })
    }

    /// The `name=value` form sent back in a `Cookie` header.
    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

// ============================================================================
// Session Tracker
// ============================================================================

#[derive(Debug, Default)]
struct SessionState {
    name: Option<String>,
    cookie: Option<SessionCookie>,
}

/// Holds the one tracked session cookie of a client.
///
/// Concurrent fetches on one client share the tracker; updates are
/// last-writer-wins.
#[derive(Debug, Default)]
pub struct SessionTracker {
    state: RwLock<SessionState>,
}

impl SessionTracker {
    /// Creates a tracker for the cookie named `name`. `None` disables tracking.
    pub fn new(name: Option<String>) -> Self {
        Self {
            state: RwLock::new(SessionState { name, cookie: None }),
        }
    }

    /// Returns true if a cookie name is configured.
    pub fn is_enabled(&self) -> bool {
        self.read(|state| state.name.is_some())
    }

    /// The configured cookie name.
    pub fn name(&self) -> Option<String> {
        self.read(|state| state.name.clone())
    }

    /// Scans `Set-Cookie` lines in order and stores the first one carrying
    /// the configured name.
    ///
    /// Returns true if the stored cookie was replaced. Cookies with other
    /// names are ignored.
    pub fn observe<'a, I>(&self, set_cookies: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let Some(name) = state.name.clone() else {
            return false;
        };

        let found = set_cookies
            .into_iter()
            .filter_map(SessionCookie::parse)
            .find(|cookie| cookie.name == name);

        match found {
            Some(cookie) => {
                debug!(cookie = %cookie.name, "Session cookie updated");
                state.cookie = Some(cookie);
                true
            }
            None => {
                trace!(cookie = %name, "No session cookie in response");
                false
            }
        }
    }

    /// The `Cookie` header value to send, if a matching cookie is stored.
    pub fn attach(&self) -> Option<String> {
        self.read(|state| {
            let name = state.name.as_deref()?;
            state
                .cookie
                .as_ref()
                .filter(|cookie| cookie.name == name)
                .map(SessionCookie::header_value)
        })
    }

    /// The stored cookie, regardless of the configured name.
    pub fn current(&self) -> Option<SessionCookie> {
        self.read(|state| state.cookie.clone())
    }

    /// Drops the stored cookie.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.cookie.take().is_some() {
            debug!("Session cleared");
        }
    }

    /// Changes the tracked cookie name.
    ///
    /// The stored cookie is kept but only replayed if its name matches.
    pub fn rename(&self, name: Option<String>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.name = name;
    }

    fn read<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }
}

// ============================================================================
// Tests
// ============================================================================
