//! Text relevance of a program against a free-text query.
//!
//! A program matches when the whole query occurs in one of its fields, or
//! when every whitespace-separated token occurs in some field. Relevance
//! orders exact title matches first, then phrase matches by the strongest
//! field they hit, then token-only matches.

use crate::programs::Program;

/// Field weights, strongest first.
const TITLE: u8 = 4;
const PREVIEW: u8 = 3;
const SUMMARY: u8 = 2;
const DETAILS: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
    Tokens,
    Phrase,
    ExactTitle,
}

/// Comparable relevance, greater is more relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Relevance {
    kind: MatchKind,
    /// strongest field holding the phrase, or holding every token
    field: u8,
    /// summed weight of fields hit
    hits: u16,
}

/// Lowercased, trimmed query with its tokens.
#[derive(Debug, Clone)]
pub struct TextQuery {
    phrase: String,
    tokens: Vec<String>,
}

impl TextQuery {
    pub fn new(query: &str) -> Self {
        let phrase = query.trim().to_lowercase();
        let tokens = phrase.split_whitespace().map(str::to_string).collect();
        Self { phrase, tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.phrase.is_empty()
    }

    pub fn matches(&self, program: &Program) -> bool {
        self.relevance(program).is_some()
    }

    /// `None` when the program does not match. The empty query matches
    /// everything with equal relevance.
    pub fn relevance(&self, program: &Program) -> Option<Relevance> {
        if self.is_empty() {
            return Some(Relevance {
                kind: MatchKind::Tokens,
                field: 0,
                hits: 0,
            });
        }

        let fields = [
            (TITLE, program.title.to_lowercase()),
            (PREVIEW, program.preview.to_lowercase()),
            (SUMMARY, program.summary.to_lowercase()),
            (DETAILS, program.details.to_lowercase()),
        ];

        if fields[0].1.trim() == self.phrase {
            return Some(Relevance {
                kind: MatchKind::ExactTitle,
                field: TITLE,
                hits: 0,
            });
        }

        let phrase_fields: Vec<u8> = fields
            .iter()
            .filter(|(_, text)| text.contains(&self.phrase))
            .map(|(weight, _)| *weight)
            .collect();

        if let Some(best) = phrase_fields.iter().max() {
            return Some(Relevance {
                kind: MatchKind::Phrase,
                field: *best,
                hits: phrase_fields.iter().map(|w| *w as u16).sum(),
            });
        }

        let mut hits: u16 = 0;
        for token in &self.tokens {
            let token_hits: u16 = fields
                .iter()
                .filter(|(_, text)| text.contains(token.as_str()))
                .map(|(weight, _)| *weight as u16)
                .sum();

            if token_hits == 0 {
                return None;
            }
            hits = hits.saturating_add(token_hits);
        }

        let field = fields
            .iter()
            .filter(|(_, text)| self.tokens.iter().all(|t| text.contains(t.as_str())))
            .map(|(weight, _)| *weight)
            .max()
            .unwrap_or(0);

        Some(Relevance {
            kind: MatchKind::Tokens,
            field,
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::{Category, Eligibility, OperatingEntityType};
    use chrono::DateTime;

    fn program(title: &str, preview: &str, summary: &str, details: &str) -> Program {
        Program {
            id: 1,
            uuid: "u".to_string(),
            category: Category::Other,
            title: title.to_string(),
            summary: summary.to_string(),
            details: details.to_string(),
            preview: preview.to_string(),
            operating_entity: String::new(),
            operating_entity_type: OperatingEntityType::Central,
            application_method: None,
            apply_url: None,
            reference_url: None,
            eligibility: Eligibility::default(),
            apply_start_at: None,
            apply_end_at: None,
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
        }
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let query = TextQuery::new("   ");
        assert!(query.is_empty());
        assert!(query.matches(&program("a", "", "", "")));
    }

    #[test]
    fn test_case_insensitive_phrase() {
        let query = TextQuery::new("Job Training");
        assert!(query.matches(&program("Senior job training", "", "", "")));
        assert!(query.matches(&program("x", "", "", "free JOB TRAINING courses")));
        assert!(!query.matches(&program("x", "", "", "")));
    }

    #[test]
    fn test_tokens_may_span_fields() {
        let query = TextQuery::new("rent seoul");
        assert!(query.matches(&program("Rent support", "", "for Seoul residents", "")));
        assert!(!query.matches(&program("Rent support", "", "", "")));
    }

    #[test]
    fn test_relevance_ordering() {
        let query = TextQuery::new("housing");

        let exact = query.relevance(&program("Housing", "", "", "")).unwrap();
        let title = query.relevance(&program("Youth housing", "", "", "")).unwrap();
        let preview = query.relevance(&program("x", "housing", "", "")).unwrap();
        let summary = query.relevance(&program("x", "", "housing", "")).unwrap();
        let details = query.relevance(&program("x", "", "", "housing")).unwrap();

        assert!(exact > title);
        assert!(title > preview);
        assert!(preview > summary);
        assert!(summary > details);
    }

    #[test]
    fn test_phrase_outranks_tokens() {
        let query = TextQuery::new("care service");

        let phrase = query.relevance(&program("x", "", "", "care service")).unwrap();
        let tokens = query.relevance(&program("service for care", "", "", "")).unwrap();

        assert!(phrase > tokens);
    }

    #[test]
    fn test_korean_text() {
        let query = TextQuery::new("주거 지원");
        assert!(query.matches(&program("청년 주거 지원", "", "", "")));
        assert!(query.matches(&program("지원 사업", "", "주거비", "")));
    }
}
