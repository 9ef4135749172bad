//! Document, page and line model
//!
//! Mirrors the page-keyed transcription JSON produced by the ingestion
//! pipeline:
//!
//! ```json
//! {
//!   "title": "Parish register",
//!   "pages": {
//!     "register_page_1": {
//!       "width": 1000, "height": 2000,
//!       "paragraphs": [
//!         { "lines": [ { "transcription": "Baptisms 1791", "bbox": [100, 50, 300, 90] } ] }
//!       ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::DocumentError;

lazy_static! {
    static ref PAGE_KEY_PATTERN: Regex = Regex::new(r"_page_(\d+)$").unwrap();
}

/// Per-page line identifier, `"<paragraph>-<line>"` with zero-based indices.
///
/// Only unique within a page: pair it with the document id and page key
/// whenever it leaves the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineUid(String);

impl LineUid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn from_position(paragraph: usize, line: usize) -> Self {
        Self(format!("{}-{}", paragraph, line))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineUid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Page identifier of the form `<anything>_page_<N>` where N is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageKey(String);

impl PageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 1-based page number, or `None` when the key carries no positive
    /// page number.
    pub fn ordinal(&self) -> Option<u32> {
        page_ordinal(&self.0)
    }

    /// Like [`PageKey::ordinal`] but treats a missing number as an error.
    pub fn require_ordinal(&self) -> Result<u32, DocumentError> {
        self.ordinal()
            .ok_or_else(|| DocumentError::InvalidPageKey(self.0.clone()))
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Extract the page number from a raw page key.
pub fn page_ordinal(key: &str) -> Option<u32> {
    let caps = PAGE_KEY_PATTERN.captures(key)?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    (n > 0).then_some(n)
}

/// Raw line box in source-image pixels. Corners may be reversed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct RawBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl RawBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }
}

impl From<[f64; 4]> for RawBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<RawBox> for [f64; 4] {
    fn from(b: RawBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Read a coordinate or page dimension, mapping anything that is not a JSON
/// number to NaN so the geometry normalizer rejects it per line.
fn lenient_number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

fn lenient_dimension<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_number(&value))
}

fn unknown_dimension() -> f64 {
    f64::NAN
}

/// `null` means the line has no box. Any other non-array value or an array
/// of the wrong length becomes an all-NaN box.
fn lenient_bbox<'de, D>(deserializer: D) -> Result<Option<RawBox>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let raw = match value {
        Value::Null => return Ok(None),
        Value::Array(items) if items.len() == 4 => RawBox::new(
            lenient_number(&items[0]),
            lenient_number(&items[1]),
            lenient_number(&items[2]),
            lenient_number(&items[3]),
        ),
        _ => RawBox::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN),
    };
    Ok(Some(raw))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(default)]
    pub transcription: String,
    #[serde(
        default,
        deserialize_with = "lenient_bbox",
        skip_serializing_if = "Option::is_none"
    )]
    pub bbox: Option<RawBox>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default = "unknown_dimension", deserialize_with = "lenient_dimension")]
    pub width: f64,
    #[serde(default = "unknown_dimension", deserialize_with = "lenient_dimension")]
    pub height: f64,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
}

/// A line together with its derived uid.
#[derive(Debug, Clone, Copy)]
pub struct PageLine<'a> {
    pub paragraph: usize,
    pub index: usize,
    pub line: &'a Line,
}

impl PageLine<'_> {
    pub fn uid(&self) -> LineUid {
        LineUid::from_position(self.paragraph, self.index)
    }
}

impl Page {
    /// All lines in reading order.
    pub fn lines(&self) -> impl Iterator<Item = PageLine<'_>> {
        self.paragraphs.iter().enumerate().flat_map(|(p, para)| {
            para.lines
                .iter()
                .enumerate()
                .map(move |(l, line)| PageLine {
                    paragraph: p,
                    index: l,
                    line,
                })
        })
    }

    pub fn line(&self, uid: &LineUid) -> Option<&Line> {
        let (p, l) = uid.as_str().split_once('-')?;
        let p: usize = p.parse().ok()?;
        let l: usize = l.parse().ok()?;
        self.paragraphs.get(p)?.lines.get(l)
    }

    pub fn line_count(&self) -> usize {
        self.paragraphs.iter().map(|p| p.lines.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub pages: BTreeMap<PageKey, Page>,
}

impl Document {
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Page keys with numbered pages first in ascending page order, then
    /// unnumbered keys in key order.
    pub fn ordered_page_keys(&self) -> Vec<&PageKey> {
        let mut keys: Vec<&PageKey> = self.pages.keys().collect();
        keys.sort_by(|a, b| match (a.ordinal(), b.ordinal()) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.cmp(b),
        });
        keys
    }

    /// Sorted distinct page numbers available for numeric navigation.
    pub fn ordinals(&self) -> Vec<u32> {
        let mut ordinals: Vec<u32> = self.pages.keys().filter_map(PageKey::ordinal).collect();
        ordinals.sort_unstable();
        ordinals.dedup();
        ordinals
    }

    pub fn page(&self, key: &PageKey) -> Result<&Page, DocumentError> {
        self.pages
            .get(key)
            .ok_or_else(|| DocumentError::PageNotFound(key.to_string()))
    }

    /// The page carrying the given number. When several keys share a number
    /// the first in key order wins.
    pub fn page_by_ordinal(&self, ordinal: u32) -> Result<(&PageKey, &Page), DocumentError> {
        self.pages
            .iter()
            .find(|(key, _)| key.ordinal() == Some(ordinal))
            .ok_or_else(|| DocumentError::PageNotFound(format!("page {}", ordinal)))
    }

    pub fn next_ordinal(&self, current: u32) -> Option<u32> {
        self.ordinals().into_iter().find(|&n| n > current)
    }

    pub fn prev_ordinal(&self, current: u32) -> Option<u32> {
        self.ordinals().into_iter().rev().find(|&n| n < current)
    }
}
