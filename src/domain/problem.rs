//! Problem Entity
//!
//! Represents one practice problem. Standard problems come from the
//! catalog and cannot be edited or deleted; custom problems are
//! user-added.

use serde::{Deserialize, Serialize};
use super::entity::{DomainError, DomainResult, Entity};

/// Problem difficulty rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "Medium" => Difficulty::Medium,
            "Hard" => Difficulty::Hard,
            _ => Difficulty::Easy,
        }
    }
}

/// A practice problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    /// Unique identifier, monotonically assigned
    pub id: u32,
    /// Problem title
    pub title: String,
    /// Link to the problem statement
    pub url: String,
    /// Topics covered (insertion order kept for display)
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Solution hint shown on demand
    #[serde(default)]
    pub hint: String,
    /// True for catalog-sourced problems; they cannot be edited or deleted
    #[serde(default, rename = "isStandard")]
    pub is_standard: bool,
}

impl Problem {
    pub fn new(id: u32, title: String, url: String) -> Self {
        Self {
            id,
            title,
            url,
            topics: Vec::new(),
            difficulty: Difficulty::Easy,
            hint: String::new(),
            is_standard: false,
        }
    }

    /// Case-insensitive title match, used for duplicate detection
    pub fn title_matches(&self, title: &str) -> bool {
        self.title.to_lowercase() == title.to_lowercase()
    }
}

impl Entity for Problem {
    type Id = u32;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Input for creating a custom problem
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemDraft {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub hint: String,
}

impl ProblemDraft {
    /// Validate required fields and build the problem with the given id.
    ///
    /// Title, url and at least one topic are required. An empty hint
    /// gets the default placeholder text.
    pub fn into_problem(self, id: u32) -> DomainResult<Problem> {
        let title = self.title.trim().to_string();
        let url = self.url.trim().to_string();
        let topics: Vec<String> = self
            .topics
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if title.is_empty() {
            return Err(DomainError::InvalidInput("title is required".to_string()));
        }
        if url.is_empty() {
            return Err(DomainError::InvalidInput("url is required".to_string()));
        }
        if topics.is_empty() {
            return Err(DomainError::InvalidInput(
                "at least one topic is required".to_string(),
            ));
        }

        let hint = if self.hint.trim().is_empty() {
            "No hint provided.".to_string()
        } else {
            self.hint.trim().to_string()
        };

        Ok(Problem {
            id,
            title,
            url,
            topics,
            difficulty: self.difficulty,
            hint,
            is_standard: false,
        })
    }
}

/// Partial update for an existing problem
///
/// `id` and `is_standard` are never patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemPatch {
    pub title: Option<String>,
    pub url: Option<String>,
    pub topics: Option<Vec<String>>,
    pub difficulty: Option<Difficulty>,
    pub hint: Option<String>,
}

impl ProblemPatch {
    /// Merge patch fields over an existing problem
    pub fn apply(self, existing: &Problem) -> Problem {
        Problem {
            id: existing.id,
            title: self.title.unwrap_or_else(|| existing.title.clone()),
            url: self.url.unwrap_or_else(|| existing.url.clone()),
            topics: self.topics.unwrap_or_else(|| existing.topics.clone()),
            difficulty: self.difficulty.unwrap_or(existing.difficulty),
            hint: self.hint.unwrap_or_else(|| existing.hint.clone()),
            is_standard: existing.is_standard,
        }
    }
}
