//! Collaborator interfaces and in-memory implementations
//!
//! The viewer talks to its backend only through these traits. The in-memory
//! versions back the tests and the command-line tool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Document, PageKey};
use crate::submit::CurrentUser;
use crate::suggestions::{apply_vote_totals, Suggestion, Vote, VoteBook};

/// Source of transcription documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch(&self, document_id: &str) -> Result<Document, StoreError>;
}

/// Suggestions and votes
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    /// Suggestions for one page with `vote_count` filled in
    async fn list(&self, document_id: &str, page_key: &PageKey)
        -> Result<Vec<Suggestion>, StoreError>;

    /// Every suggestion on a document, for the leaderboard
    async fn list_document(&self, document_id: &str) -> Result<Vec<Suggestion>, StoreError>;

    /// Votes on suggestions of a document
    async fn votes(&self, document_id: &str) -> Result<Vec<Vote>, StoreError>;

    async fn insert(&self, suggestion: Suggestion) -> Result<(), StoreError>;

    /// Insert or replace the vote of `vote.voter_id` on `vote.suggestion_id`
    async fn upsert_vote(&self, vote: Vote) -> Result<(), StoreError>;
}

/// Who is signed in, and what everyone is called
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `None` when signed out
    fn current_user(&self) -> Option<CurrentUser>;

    /// Current usernames for the given user ids. Ids without a profile are
    /// left out.
    async fn usernames(&self, user_ids: &[String]) -> Result<HashMap<String, String>, StoreError>;
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: HashMap<String, Document>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under its id (overriding `document.id`).
    pub fn insert(&mut self, id: &str, mut document: Document) {
        document.id = id.to_string();
        self.documents.insert(id.to_string(), document);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self, document_id: &str) -> Result<Document, StoreError> {
        self.documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("document {}", document_id)))
    }
}

#[derive(Debug, Default)]
struct SuggestionTables {
    suggestions: Vec<Suggestion>,
    votes: VoteBook,
}

/// Suggestion store kept in memory. It can be switched offline to exercise
/// failure handling.
#[derive(Debug, Default)]
pub struct MemorySuggestionStore {
    tables: Mutex<SuggestionTables>,
    offline: AtomicBool,
}

impl MemorySuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(suggestions: Vec<Suggestion>, votes: VoteBook) -> Self {
        Self {
            tables: Mutex::new(SuggestionTables { suggestions, votes }),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("suggestion store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn select<F>(&self, filter: F) -> Result<Vec<Suggestion>, StoreError>
    where
        F: Fn(&Suggestion) -> bool,
    {
        self.check_online()?;
        let tables = self.tables.lock().map_err(poisoned)?;
        let mut rows: Vec<Suggestion> = tables
            .suggestions
            .iter()
            .filter(|s| filter(*s))
            .cloned()
            .collect();
        apply_vote_totals(&mut rows, &tables.votes);
        Ok(rows)
    }
}

#[async_trait]
impl SuggestionStore for MemorySuggestionStore {
    async fn list(
        &self,
        document_id: &str,
        page_key: &PageKey,
    ) -> Result<Vec<Suggestion>, StoreError> {
        self.select(|s| s.document_id == document_id && &s.page_key == page_key)
    }

    async fn list_document(&self, document_id: &str) -> Result<Vec<Suggestion>, StoreError> {
        self.select(|s| s.document_id == document_id)
    }

    async fn votes(&self, document_id: &str) -> Result<Vec<Vote>, StoreError> {
        self.check_online()?;
        let tables = self.tables.lock().map_err(poisoned)?;
        let ids: Vec<Uuid> = tables
            .suggestions
            .iter()
            .filter(|s| s.document_id == document_id)
            .map(|s| s.id)
            .collect();
        Ok(tables
            .votes
            .iter()
            .filter(|v| ids.contains(&v.suggestion_id))
            .collect())
    }

    async fn insert(&self, suggestion: Suggestion) -> Result<(), StoreError> {
        self.check_online()?;
        let mut tables = self.tables.lock().map_err(poisoned)?;
        if tables.suggestions.iter().any(|s| s.id == suggestion.id) {
            return Err(StoreError::Conflict(format!("suggestion {}", suggestion.id)));
        }
        tables.suggestions.push(suggestion);
        Ok(())
    }

    async fn upsert_vote(&self, vote: Vote) -> Result<(), StoreError> {
        self.check_online()?;
        let mut tables = self.tables.lock().map_err(poisoned)?;
        if !tables.suggestions.iter().any(|s| s.id == vote.suggestion_id) {
            return Err(StoreError::NotFound(format!("suggestion {}", vote.suggestion_id)));
        }
        tables.votes.upsert(vote);
        Ok(())
    }
}

/// Fixed identity: a possibly signed-in user plus a profile table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    pub user: Option<CurrentUser>,
    pub profiles: HashMap<String, String>,
    pub profiles_unavailable: bool,
}

impl StaticIdentity {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(user: CurrentUser) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<CurrentUser> {
        self.user.clone()
    }

    async fn usernames(&self, user_ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        if self.profiles_unavailable {
            return Err(StoreError::Unavailable("profile service".to_string()));
        }
        Ok(user_ids
            .iter()
            .filter_map(|id| self.profiles.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }
}
