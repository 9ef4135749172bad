//! Client-side checks run before a suggestion or vote reaches a store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SubmitError;
use crate::model::{LineUid, Page, PageKey};
use crate::suggestions::{Suggestion, Vote};

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// A suggestion that passed validation but has no id yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewSuggestion {
    pub document_id: String,
    pub page_key: PageKey,
    pub uid: LineUid,
    pub suggested_text: String,
    pub comment: Option<String>,
    pub author_id: String,
    pub author_username: Option<String>,
}

impl NewSuggestion {
    pub fn into_suggestion(self, created_at: DateTime<Utc>) -> Suggestion {
        Suggestion {
            id: Uuid::new_v4(),
            document_id: self.document_id,
            page_key: self.page_key,
            uid: self.uid,
            suggested_text: self.suggested_text,
            comment: self.comment,
            author_id: self.author_id,
            author_username: self.author_username,
            created_at,
            vote_count: 0,
        }
    }
}

/// Validate a correction for `uid` on `page`.
///
/// Text and comment are trimmed; a blank comment becomes `None`.
pub fn validate_suggestion(
    user: Option<&CurrentUser>,
    document_id: &str,
    page_key: &PageKey,
    page: &Page,
    uid: &LineUid,
    text: &str,
    comment: Option<&str>,
) -> Result<NewSuggestion, SubmitError> {
    let user = user.ok_or(SubmitError::NotSignedIn)?;
    let line = page
        .line(uid)
        .ok_or_else(|| SubmitError::UnknownLine(uid.to_string()))?;

    let text = text.trim();
    if text.is_empty() {
        return Err(SubmitError::EmptySuggestion);
    }
    if text == line.transcription.trim() {
        return Err(SubmitError::UnchangedTranscription);
    }

    Ok(NewSuggestion {
        document_id: document_id.to_string(),
        page_key: page_key.clone(),
        uid: uid.clone(),
        suggested_text: text.to_string(),
        comment: comment
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        author_id: user.id.clone(),
        author_username: user.username.clone(),
    })
}

/// Validate a vote. `0` withdraws an earlier vote.
pub fn validate_vote(
    user: Option<&CurrentUser>,
    suggestion_id: Uuid,
    value: i32,
) -> Result<Vote, SubmitError> {
    let user = user.ok_or(SubmitError::NotSignedIn)?;
    if !(-1..=1).contains(&value) {
        return Err(SubmitError::InvalidVote(value));
    }
    Ok(Vote {
        suggestion_id,
        voter_id: user.id.clone(),
        value,
    })
}
