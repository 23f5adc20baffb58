//! Crawl frontier with accept-once semantics
//!
//! The frontier owns every scheduling decision of one crawl run:
//! - same-site scoping against the base URL's host
//! - the depth limit and the skip policy
//! - the accept-once visited set and the global page cap
//! - the pending queue and the count of entries still being worked on
//!
//! All of this sits behind one mutex, so the check-and-insert performed by
//! [`Frontier::try_enqueue`] is linearizable across concurrent workers.

use crate::url::{host_key, in_scope, should_skip};
use crate::{UrlError, UrlResult};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A URL scheduled for fetching, with the depth it was discovered at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Absolute URL, fragment removed
    pub url: Url,
    pub depth: u32,
}

#[derive(Default)]
struct FrontierState {
    seen: HashSet<String>,
    queue: VecDeque<FrontierEntry>,
    accepted: u32,
    in_flight: usize,
}

/// Per-run set of discovered URLs and the queue feeding the fetch workers
pub struct Frontier {
    allowed_host: String,
    max_depth: u32,
    max_pages: u32,
    state: Mutex<FrontierState>,
    notify: Notify,
}

impl Frontier {
    /// Creates a frontier scoped to the host of `base`
    pub fn new(base: &Url, max_depth: u32, max_pages: u32) -> UrlResult<Self> {
        let allowed_host = host_key(base).ok_or(UrlError::MissingHost)?;

        Ok(Self {
            allowed_host,
            max_depth,
            max_pages,
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if `url` is on the crawled site
    pub fn in_scope(&self, url: &Url) -> bool {
        in_scope(url, &self.allowed_host)
    }

    /// Enqueues the crawl's starting URL at depth 0
    ///
    /// The seed is exempt from the skip policy but counts toward the page cap.
    pub fn seed(&self, url: &Url) -> bool {
        self.accept(url, 0, false)
    }

    /// Offers a discovered URL
    ///
    /// Returns true exactly once per normalized URL. Off-site URLs, URLs past
    /// the depth limit and URLs matching the skip policy are rejected without
    /// being remembered; once the page cap is reached every offer is rejected.
    pub fn try_enqueue(&self, url: &Url, depth: u32) -> bool {
        self.accept(url, depth, true)
    }

    fn accept(&self, url: &Url, depth: u32, apply_skip_policy: bool) -> bool {
        let mut url = url.clone();
        url.set_fragment(None);

        if !in_scope(&url, &self.allowed_host) || depth > self.max_depth {
            return false;
        }
        if apply_skip_policy && should_skip(url.as_str()) {
            return false;
        }

        {
            let mut state = self.state();
            if state.accepted >= self.max_pages {
                return false;
            }
            if !state.seen.insert(url.as_str().to_string()) {
                return false;
            }
            state.accepted += 1;
            state.queue.push_back(FrontierEntry { url, depth });
        }

        self.notify.notify_waiters();
        true
    }

    /// Marks a URL as visited without scheduling it
    ///
    /// Used for redirect targets, so a page reached through a redirect is not
    /// fetched a second time under its final address. Returns false if the
    /// URL was already known to this frontier.
    pub fn mark_seen(&self, url: &Url) -> bool {
        let mut url = url.clone();
        url.set_fragment(None);
        self.state().seen.insert(url.as_str().to_string())
    }

    /// Waits for the next entry to work on
    ///
    /// Returns `None` once the queue is empty and no entry is in flight (no
    /// worker can enqueue anything anymore), or when `cancel` fires. Every
    /// entry returned must be handed back through [`Frontier::complete_entry`].
    pub async fn next_entry(&self, cancel: &CancellationToken) -> Option<FrontierEntry> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            // Register before checking the queue so a concurrent wake-up is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(entry) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(entry);
                }
                if state.in_flight == 0 {
                    return None;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Reports that an entry returned by `next_entry` is fully processed
    pub fn complete_entry(&self) {
        {
            let mut state = self.state();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// Number of URLs accepted so far
    pub fn accepted(&self) -> u32 {
        self.state().accepted
    }

    /// Number of URLs waiting to be fetched
    pub fn pending(&self) -> usize {
        self.state().queue.len()
    }
}
