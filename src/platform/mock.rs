//! Mock platform for testing.
//!
//! Assigns identifiers from a shared counter (or a scripted queue), replays
//! scripted listings, and records every call so tests can inspect them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::traits::*;
use crate::codec::PostId;

#[derive(Debug, Default)]
struct MockState {
    next_ordinal: u64,
    assignments: VecDeque<u64>,
    stream: VecDeque<Vec<u64>>,
    last_listing: Vec<u64>,
    created: Vec<Submission>,
    deleted: Vec<Item>,
    edited: Vec<(Item, String)>,
    list_calls: usize,
    fail_create: bool,
    fail_delete: bool,
    fail_edit: bool,
    fail_list: bool,
}

/// One recorded `create_item` call.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Name of the handle that made the call
    pub handle: String,
    pub title: String,
    pub body: String,
    pub item: Item,
}

/// Mock platform.
///
/// Handles created with [`MockPlatform::handle`] share the same state, so
/// several identities racing against one mock see a single, platform-wide
/// ordinal sequence.
#[derive(Clone)]
pub struct MockPlatform {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    /// Create a new mock whose first assigned ordinal is `first_ordinal`.
    pub fn new(name: impl Into<String>, first_ordinal: u64) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState {
                next_ordinal: first_ordinal,
                ..MockState::default()
            })),
        }
    }

    /// Another client on the same simulated platform.
    pub fn handle(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::clone(&self.state),
        }
    }

    /// Ordinals handed out by `create_item` before falling back to the counter.
    pub fn with_assignments(self, ordinals: impl IntoIterator<Item = u64>) -> Self {
        self.lock().assignments.extend(ordinals);
        self
    }

    /// Listings returned by successive `list_recent` calls.
    ///
    /// Once exhausted the last listing is repeated.
    pub fn with_stream(self, listings: impl IntoIterator<Item = Vec<u64>>) -> Self {
        self.lock().stream.extend(listings);
        self
    }

    pub fn failing_create(self) -> Self {
        self.lock().fail_create = true;
        self
    }

    pub fn failing_delete(self) -> Self {
        self.lock().fail_delete = true;
        self
    }

    pub fn failing_edit(self) -> Self {
        self.lock().fail_edit = true;
        self
    }

    pub fn failing_list(self) -> Self {
        self.lock().fail_list = true;
        self
    }

    /// Items created so far, in creation order.
    pub fn created(&self) -> Vec<Submission> {
        self.lock().created.clone()
    }

    pub fn deleted(&self) -> Vec<Item> {
        self.lock().deleted.clone()
    }

    pub fn edited(&self) -> Vec<(Item, String)> {
        self.lock().edited.clone()
    }

    /// Number of `list_recent` calls made.
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn item_for(ordinal: u64) -> Result<Item, PlatformError> {
    PostId::from_ordinal(ordinal)
        .map(Item::new)
        .map_err(|e| PlatformError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl ContentPlatform for MockPlatform {
    fn id(&self) -> &str {
        &self.name
    }

    async fn create_item(
        &self,
        _location: &Location,
        title: &str,
        body: &str,
    ) -> Result<Item, PlatformError> {
        let mut state = self.lock();
        if state.fail_create {
            return Err(PlatformError::Network("mock create disabled".to_string()));
        }

        let ordinal = match state.assignments.pop_front() {
            Some(ordinal) => ordinal,
            None => {
                let ordinal = state.next_ordinal;
                state.next_ordinal += 1;
                ordinal
            }
        };

        let item = item_for(ordinal)?.with_created_at(Utc::now());
        state.created.push(Submission {
            handle: self.name.clone(),
            title: title.to_string(),
            body: body.to_string(),
            item: item.clone(),
        });
        Ok(item)
    }

    async fn delete_item(&self, item: &Item) -> Result<(), PlatformError> {
        let mut state = self.lock();
        if state.fail_delete {
            return Err(PlatformError::RequestFailed("mock delete disabled".to_string()));
        }
        state.deleted.push(item.clone());
        Ok(())
    }

    async fn edit_item(&self, item: &Item, body: &str) -> Result<(), PlatformError> {
        let mut state = self.lock();
        if state.fail_edit {
            return Err(PlatformError::RateLimited {
                retry_after_secs: Some(1),
            });
        }
        state.edited.push((item.clone(), body.to_string()));
        Ok(())
    }

    async fn list_recent(
        &self,
        _location: &Location,
        limit: usize,
    ) -> Result<Vec<Item>, PlatformError> {
        let mut state = self.lock();
        state.list_calls += 1;
        if state.fail_list {
            return Err(PlatformError::Network("mock listing disabled".to_string()));
        }

        if let Some(listing) = state.stream.pop_front() {
            state.last_listing = listing;
        }
        state
            .last_listing
            .iter()
            .take(limit)
            .map(|&ordinal| item_for(ordinal))
            .collect()
    }
}
