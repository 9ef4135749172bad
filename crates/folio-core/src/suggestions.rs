//! Suggestion ranking, vote tallies and the contributor leaderboard
//!
//! All functions here are pure: callers hand in whatever rows the stores
//! returned and get deterministic orderings back.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{LineUid, PageKey};

/// Suggestions surfaced per line before "show all"
pub const DEFAULT_VISIBLE_PER_LINE: usize = 5;
/// Rows on the leaderboard
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
/// Author id characters used for the placeholder display name
pub const DEFAULT_FALLBACK_PREFIX_LEN: usize = 8;

/// A proposed replacement transcription for one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub document_id: String,
    pub page_key: PageKey,
    pub uid: LineUid,
    pub suggested_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub author_id: String,
    /// Username at submission time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_username: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Net vote total, filled in from the votes table
    #[serde(default)]
    pub vote_count: i64,
}

/// One voter's vote on one suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub suggestion_id: Uuid,
    pub voter_id: String,
    pub value: i32,
}

/// Votes keyed by `(suggestion, voter)`; casting again replaces the earlier
/// vote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteBook {
    votes: HashMap<(Uuid, String), i32>,
}

impl VoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, vote: Vote) {
        self.votes
            .insert((vote.suggestion_id, vote.voter_id), vote.value);
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Net score of a suggestion
    pub fn total(&self, suggestion_id: &Uuid) -> i64 {
        self.votes
            .iter()
            .filter(|((id, _), _)| id == suggestion_id)
            .map(|(_, &value)| i64::from(value))
            .sum()
    }

    pub fn totals(&self) -> HashMap<Uuid, i64> {
        let mut totals = HashMap::new();
        for ((id, _), &value) in &self.votes {
            *totals.entry(*id).or_insert(0) += i64::from(value);
        }
        totals
    }

    pub fn iter(&self) -> impl Iterator<Item = Vote> + '_ {
        self.votes.iter().map(|((id, voter), &value)| Vote {
            suggestion_id: *id,
            voter_id: voter.clone(),
            value,
        })
    }
}

impl FromIterator<Vote> for VoteBook {
    fn from_iter<I: IntoIterator<Item = Vote>>(iter: I) -> Self {
        let mut book = VoteBook::new();
        for vote in iter {
            book.upsert(vote);
        }
        book
    }
}

/// Overwrite each suggestion's `vote_count` with the tally from `votes`.
pub fn apply_vote_totals(suggestions: &mut [Suggestion], votes: &VoteBook) {
    let totals = votes.totals();
    for s in suggestions {
        s.vote_count = totals.get(&s.id).copied().unwrap_or(0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Most votes first, newer first on ties
    #[default]
    Top,
    /// Newest first
    Newest,
}

fn compare(a: &Suggestion, b: &Suggestion, mode: SortMode) -> Ordering {
    let primary = match mode {
        SortMode::Top => b
            .vote_count
            .cmp(&a.vote_count)
            .then_with(|| b.created_at.cmp(&a.created_at)),
        SortMode::Newest => b.created_at.cmp(&a.created_at),
    };
    // Exact ties fall back to the id so re-renders never reshuffle.
    primary.then_with(|| a.id.cmp(&b.id))
}

pub fn sort_suggestions(suggestions: &mut [Suggestion], mode: SortMode) {
    suggestions.sort_by(|a, b| compare(a, b, mode));
}

/// Ranked suggestions for one line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedLine {
    pub uid: LineUid,
    pub mode: SortMode,
    pub entries: Vec<Suggestion>,
}

impl RankedLine {
    pub fn new(uid: LineUid, mut entries: Vec<Suggestion>, mode: SortMode) -> Self {
        sort_suggestions(&mut entries, mode);
        Self { uid, mode, entries }
    }

    /// The first `cap` entries, shown by default
    pub fn visible(&self, cap: usize) -> &[Suggestion] {
        &self.entries[..self.entries.len().min(cap)]
    }

    pub fn hidden_count(&self, cap: usize) -> usize {
        self.entries.len().saturating_sub(cap)
    }

    pub fn best(&self) -> Option<&Suggestion> {
        self.entries.first()
    }
}

/// Group suggestions by line and rank each group.
pub fn rank_by_line(suggestions: &[Suggestion], mode: SortMode) -> BTreeMap<LineUid, RankedLine> {
    rank_by_line_with(suggestions, |_| mode)
}

/// Like [`rank_by_line`] with a sort mode chosen per line.
pub fn rank_by_line_with<F>(suggestions: &[Suggestion], mode_for: F) -> BTreeMap<LineUid, RankedLine>
where
    F: Fn(&LineUid) -> SortMode,
{
    let mut groups: BTreeMap<LineUid, Vec<Suggestion>> = BTreeMap::new();
    for s in suggestions {
        groups.entry(s.uid.clone()).or_default().push(s.clone());
    }
    groups
        .into_iter()
        .map(|(uid, entries)| {
            let mode = mode_for(&uid);
            (uid.clone(), RankedLine::new(uid, entries, mode))
        })
        .collect()
}

/// Leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub author_id: String,
    pub display_name: String,
    pub upvotes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardOptions {
    pub limit: usize,
    pub fallback_prefix_len: usize,
}

impl Default for LeaderboardOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LEADERBOARD_SIZE,
            fallback_prefix_len: DEFAULT_FALLBACK_PREFIX_LEN,
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Display name for an author: live profile name, else the snapshot taken
/// when they submitted, else a placeholder built from their id.
pub fn display_name(
    author_id: &str,
    profile_username: Option<&str>,
    snapshot: Option<&str>,
    prefix_len: usize,
) -> String {
    if let Some(name) = non_blank(profile_username).or_else(|| non_blank(snapshot)) {
        return name.to_string();
    }
    let prefix: String = author_id.trim().chars().take(prefix_len).collect();
    if prefix.is_empty() {
        "user-unknown".to_string()
    } else {
        format!("user-{}", prefix)
    }
}

/// Rank suggestion authors by upvotes received.
///
/// Only votes with value exactly `1` count, and they are credited to the
/// author of the suggestion voted on. Votes on suggestions missing from
/// `suggestions` are ignored.
pub fn leaderboard(
    suggestions: &[Suggestion],
    votes: &VoteBook,
    profiles: &HashMap<String, String>,
    options: LeaderboardOptions,
) -> Vec<LeaderboardRow> {
    let by_id: HashMap<Uuid, &Suggestion> = suggestions.iter().map(|s| (s.id, s)).collect();

    let mut upvotes: HashMap<&str, u64> = HashMap::new();
    for vote in votes.iter().filter(|v| v.value == 1) {
        if let Some(s) = by_id.get(&vote.suggestion_id) {
            *upvotes.entry(s.author_id.as_str()).or_insert(0) += 1;
        }
    }

    // Newest non-blank snapshot per author
    let mut snapshots: HashMap<&str, (&DateTime<Utc>, &str)> = HashMap::new();
    for s in suggestions {
        if let Some(name) = non_blank(s.author_username.as_deref()) {
            let entry = snapshots
                .entry(s.author_id.as_str())
                .or_insert((&s.created_at, name));
            if s.created_at > *entry.0 {
                *entry = (&s.created_at, name);
            }
        }
    }

    let mut rows: Vec<LeaderboardRow> = upvotes
        .into_iter()
        .map(|(author, count)| LeaderboardRow {
            author_id: author.to_string(),
            display_name: display_name(
                author,
                profiles.get(author).map(String::as_str),
                snapshots.get(author).map(|(_, name)| *name),
                options.fallback_prefix_len,
            ),
            upvotes: count,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.upvotes
            .cmp(&a.upvotes)
            .then_with(|| a.author_id.cmp(&b.author_id))
    });
    rows.truncate(options.limit);
    rows
}
