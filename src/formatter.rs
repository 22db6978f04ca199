// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Merging generated metadata with what an image already carries
//!
//! Both operations are idempotent: feeding a result back in as the
//! "existing" metadata of a second run yields the same result.

use serde::Serialize;

use crate::config::ProcessingConfig;
use crate::relationships::RelationshipGraph;

/// Most tags kept from a single model response
const MAX_AI_TAGS: usize = 15;
const MAX_TAG_CHARS: usize = 25;
const MAX_TAG_WORDS: usize = 3;

const TAG_PREFIXES: &[&str] = &["the tags are:", "tags are:", "tag list:", "keywords:", "tags:"];

/// Fragments that mark a sentence rather than a keyword
const NON_TAG_PHRASES: &[&str] = &[
    "do not", "does not", "is not", "are not", "was not", "were not",
    "seem", "appears", "looks like", "this image", "the image",
    "in the", "on the", "at the", "characterized by", "features a",
    "showing", "shows", "the overall", "the background", "the foreground",
];

/// Caption and keywords to write back to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataUpdate {
    pub caption: String,
    pub keywords: Vec<String>,
}

impl MetadataUpdate {
    /// Keywords in the host's single-string form
    pub fn keywords_string(&self) -> String {
        self.keywords.join(", ")
    }
}

/// Applies the caption and keyword merge rules
#[derive(Debug, Clone)]
pub struct MetadataFormatter {
    marker_tag: String,
    preserve_existing: bool,
    tag_people: bool,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn trim_sentence(text: &str) -> &str {
    text.trim().trim_end_matches('.').trim_end()
}

fn ends_sentence(text: &str) -> bool {
    text.ends_with(['.', '!', '?'])
}

/// Join two sentences, adding a period only when `caption` lacks a terminator
fn append_sentence(caption: &str, next: &str) -> String {
    if caption.is_empty() {
        next.to_string()
    } else if ends_sentence(caption) {
        format!("{} {}", caption, next)
    } else {
        format!("{}. {}", caption, next)
    }
}

/// "A", "A and B", "A, B and C"
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// Trim, collapse inner whitespace and strip wrapping quotes
pub fn normalize_keyword(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl MetadataFormatter {
    pub fn new(marker_tag: impl Into<String>, preserve_existing: bool, tag_people: bool) -> Self {
        Self {
            marker_tag: marker_tag.into(),
            preserve_existing,
            tag_people,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(&config.marker_tag, config.preserve_existing, config.tag_people)
    }

    pub fn marker_tag(&self) -> &str {
        &self.marker_tag
    }

    /// Build the final caption.
    ///
    /// The existing caption is kept ahead of the generated one when
    /// preserving, and generated text already present in it is not repeated.
    /// A people clause and the location are appended unless already there.
    pub fn format_caption(
        &self,
        ai_caption: &str,
        existing_caption: Option<&str>,
        location: Option<&str>,
        people: &[String],
        relationships: &RelationshipGraph,
    ) -> String {
        // Presence checks run on the untrimmed text so names ending in "."
        // still match on reprocessing.
        let ai = ai_caption.trim();
        let existing = existing_caption.map(str::trim).filter(|c| !c.is_empty());

        let mut caption = match existing {
            Some(existing) if self.preserve_existing => {
                if ai.is_empty() || contains_ci(existing, trim_sentence(ai)) {
                    existing.to_string()
                } else {
                    append_sentence(existing, ai)
                }
            }
            Some(existing) if ai.is_empty() => existing.to_string(),
            _ => ai.to_string(),
        };

        let people_clause = if people.is_empty() {
            None
        } else {
            let clause = relationships
                .phrase(people)
                .unwrap_or_else(|| join_names(people));
            (!contains_ci(&caption, &clause)).then_some(clause)
        };

        let location = location
            .map(str::trim)
            .filter(|l| !l.is_empty() && !contains_ci(&caption, l));

        let tail = match (people_clause, location) {
            (Some(clause), Some(location)) => Some(format!("{} at {}", clause, location)),
            (Some(clause), None) => Some(clause),
            (None, Some(location)) => Some(format!("Taken at {}", location)),
            (None, None) => None,
        };

        if let Some(tail) = tail {
            caption = append_sentence(&caption, &tail);
        }

        if !caption.is_empty() && !ends_sentence(&caption) {
            caption.push('.');
        }
        caption
    }

    /// Build the final keyword list.
    ///
    /// Order is existing (when preserving), generated, people, location, then
    /// the marker. Duplicates are removed case-insensitively, keeping the
    /// first spelling seen. The marker is always present.
    pub fn format_tags(
        &self,
        ai_tags: &[String],
        existing_tags: &[String],
        people: &[String],
        location_tags: &[String],
    ) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        let mut push = |raw: &str| {
            for part in raw.split([',', ';']) {
                let tag = normalize_keyword(part);
                if tag.is_empty() {
                    continue;
                }
                let key = tag.to_lowercase();
                if !seen.contains(&key) {
                    seen.push(key);
                    tags.push(tag);
                }
            }
        };

        if self.preserve_existing {
            existing_tags.iter().for_each(|t| push(t.as_str()));
        }
        ai_tags.iter().for_each(|t| push(t.as_str()));
        if self.tag_people {
            people.iter().for_each(|p| push(p.as_str()));
        }
        location_tags.iter().for_each(|t| push(t.as_str()));
        push(self.marker_tag.as_str());

        tags
    }

    pub fn update(&self, caption: String, keywords: Vec<String>) -> MetadataUpdate {
        MetadataUpdate { caption, keywords }
    }
}

fn clean_ai_tag(raw: &str) -> Option<String> {
    let mut tag = raw.trim();
    tag = tag.trim_start_matches(['-', '*', '•']).trim_start();
    let digits = tag.len() - tag.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 && tag[digits..].starts_with(['.', ')']) {
        tag = tag[digits + 1..].trim_start();
    }
    let tag = tag.trim_matches(|c: char| ".,;:!?-()[]{}'\"".contains(c) || c.is_whitespace());

    let tag = tag.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if tag.chars().count() < 2
        || tag.chars().count() > MAX_TAG_CHARS
        || tag.split(' ').count() > MAX_TAG_WORDS
        || NON_TAG_PHRASES.iter().any(|p| tag.contains(p))
    {
        return None;
    }
    Some(tag)
}

/// Extract short keywords from a free-text model response
pub fn parse_ai_tags(response: &str) -> Vec<String> {
    let mut body = response.trim();
    let lower = body.to_lowercase();
    if let Some(prefix) = TAG_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
        body = body[prefix.len()..].trim();
    }

    let mut tags: Vec<String> = Vec::new();
    for tag in body.split([',', ';', '\n']).filter_map(clean_ai_tag) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
        if tags.len() == MAX_AI_TAGS {
            break;
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::RelationshipEdge;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn spouses() -> RelationshipGraph {
        RelationshipGraph::new(
            vec![RelationshipEdge {
                from: "John Doe".into(),
                to: "Jane Smith".into(),
                label: "spouse".into(),
                possessive: Some("his".into()),
            }],
            Vec::new(),
        )
    }

    fn formatter() -> MetadataFormatter {
        MetadataFormatter::new("smugvision", true, true)
    }

    #[test]
    fn test_beach_caption() {
        let caption = formatter().format_caption(
            "People enjoying a sunset",
            Some("Family at the beach"),
            Some("Golden Gate Bridge, San Francisco"),
            &names(&["John Doe", "Jane Smith"]),
            &spouses(),
        );
        assert_eq!(
            caption,
            "Family at the beach. People enjoying a sunset. John with his spouse Jane at Golden Gate Bridge, San Francisco."
        );
    }

    #[test]
    fn test_caption_idempotent_on_reprocess() {
        let graph = spouses();
        let cases: Vec<(&str, Option<&str>, Option<&str>, Vec<String>)> = vec![
            ("People enjoying a sunset", Some("Family at the beach"), Some("Golden Gate Bridge"), names(&["John Doe", "Jane Smith"])),
            ("A dog runs.", None, None, Vec::new()),
            ("A dog runs", Some("Old caption."), Some("Louisville, Kentucky"), Vec::new()),
            ("Kids playing", None, None, names(&["Ann", "Bo", "Cy"])),
        ];

        for (ai, existing, location, people) in cases {
            let f = formatter();
            let first = f.format_caption(ai, existing, location, &people, &graph);
            let second = f.format_caption(ai, Some(&first), location, &people, &graph);
            assert_eq!(first, second);
            assert_eq!(first.matches(trim_sentence(ai)).count(), 1);
        }
    }

    #[test]
    fn test_caption_idempotent_with_trailing_periods() {
        let f = formatter();
        let graph = RelationshipGraph::default();

        let first = f.format_caption("A dog runs", None, Some("Washington, D.C."), &[], &graph);
        assert_eq!(first, "A dog runs. Taken at Washington, D.C.");
        let second = f.format_caption("A dog runs", Some(&first), Some("Washington, D.C."), &[], &graph);
        assert_eq!(first, second);

        let people = names(&["John Doe Jr."]);
        let first = f.format_caption("A dog runs", None, None, &people, &graph);
        assert_eq!(first, "A dog runs. John Doe Jr.");
        let second = f.format_caption("A dog runs", Some(&first), None, &people, &graph);
        assert_eq!(first, second);

        let first = f.format_caption("A dog runs", None, Some("Washington, D.C."), &people, &graph);
        let second = f.format_caption("A dog runs", Some(&first), Some("Washington, D.C."), &people, &graph);
        assert_eq!(first, "A dog runs. John Doe Jr. at Washington, D.C.");
        assert_eq!(first, second);
    }

    #[test]
    fn test_caption_keeps_question_and_exclamation_marks() {
        let f = formatter();
        let graph = RelationshipGraph::default();
        let caption = f.format_caption("Is that a dog?", None, None, &names(&["Ann"]), &graph);
        assert_eq!(caption, "Is that a dog? Ann.");

        let caption = f.format_caption("What a view!", Some("Summit day!"), Some("Mount Hood"), &[], &graph);
        assert_eq!(caption, "Summit day! What a view! Taken at Mount Hood.");
    }

    #[test]
    fn test_caption_without_preserve_replaces_existing() {
        let f = MetadataFormatter::new("smugvision", false, true);
        let caption = f.format_caption("A red barn", Some("Old text"), None, &[], &RelationshipGraph::default());
        assert_eq!(caption, "A red barn.");
    }

    #[test]
    fn test_people_list_and_location_only() {
        let f = formatter();
        let graph = RelationshipGraph::default();
        let caption = f.format_caption("Kids playing", None, None, &names(&["Ann", "Bo", "Cy"]), &graph);
        assert_eq!(caption, "Kids playing. Ann, Bo and Cy.");

        let caption = f.format_caption(
            "Lunch",
            None,
            None,
            &names(&["John Doe", "Jane Smith"]),
            &graph,
        );
        assert_eq!(caption, "Lunch. John Doe and Jane Smith.");

        let caption = f.format_caption("A dog runs", None, Some("Waterfront Park"), &[], &graph);
        assert_eq!(caption, "A dog runs. Taken at Waterfront Park.");

        let caption = f.format_caption("Lunch at Waterfront Park", None, Some("waterfront park"), &[], &graph);
        assert_eq!(caption, "Lunch at Waterfront Park.");
    }

    #[test]
    fn test_tags_merge_and_dedupe() {
        let tags = formatter().format_tags(
            &names(&["Beach", "sunset", "SUNSET"]),
            &names(&["beach", "Vacation"]),
            &names(&["John Doe"]),
            &names(&["home", "Home"]),
        );
        assert_eq!(tags, names(&["beach", "Vacation", "sunset", "John Doe", "home", "smugvision"]));
    }

    #[test]
    fn test_marker_always_present_without_duplicates() {
        for preserve in [true, false] {
            for existing in [names(&[]), names(&["SmugVision", "old"]), names(&["a, b", " a "])] {
                let f = MetadataFormatter::new("smugvision", preserve, false);
                let tags = f.format_tags(&names(&["smugvision", "x"]), &existing, &names(&["P"]), &[]);
                assert!(tags.iter().any(|t| t.eq_ignore_ascii_case("smugvision")));
                let mut lowered: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
                let before = lowered.len();
                lowered.sort();
                lowered.dedup();
                assert_eq!(before, lowered.len());
                assert!(!tags.contains(&"P".to_string()));
                if !preserve {
                    assert!(!tags.contains(&"old".to_string()));
                }
            }
        }
    }

    #[test]
    fn test_parse_ai_tags() {
        let tags = parse_ai_tags("Tags: Sunset, beach; 1. Golden Hour\n- ocean waves\n* this image shows a beach, a very long descriptive tag that goes on, sunset");
        assert_eq!(tags, names(&["sunset", "beach", "golden hour", "ocean waves"]));
    }

    #[test]
    fn test_parse_ai_tags_caps_count() {
        let response: Vec<String> = (0..30).map(|i| format!("tag{}", i)).collect();
        assert_eq!(parse_ai_tags(&response.join(", ")).len(), MAX_AI_TAGS);
    }

    #[test]
    fn test_update_keywords_string() {
        let update = formatter().update("Caption.".into(), names(&["a", "b"]));
        assert_eq!(update.keywords_string(), "a, b");
    }
}
