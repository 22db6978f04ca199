// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Prompt templating
//!
//! Templates are plain text with a closed set of placeholders:
//! `{location}`, `{people}`, `{date}`, `{album}` and `{context}`. Any other
//! brace group is left as written.

use crate::formatter::join_names;

/// What is known about an image before captioning
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub album: Option<String>,
    pub location: Option<String>,
    pub people: Vec<String>,
    pub relationships: Option<String>,
    pub date: Option<String>,
    /// Faces detected, including unidentified ones
    pub total_faces: usize,
}

impl PromptContext {
    fn people_sentence(&self) -> Option<String> {
        if self.people.is_empty() {
            return None;
        }
        let names = join_names(&self.people);

        if let Some(relationships) = &self.relationships {
            return Some(format!(
                "The people in this image are {} ({}). Use their names and describe the relationship naturally.",
                names, relationships
            ));
        }

        let sentence = match (self.people.len(), self.total_faces > self.people.len()) {
            (1, false) => format!("The person in this image is {}. Use their name in the caption.", names),
            (_, false) => format!("The people in this image are {}. Use their names in the caption.", names),
            (_, true) => format!(
                "There are {} people in this image, including {}. Use their names and mention the others.",
                self.total_faces, names
            ),
        };
        Some(sentence)
    }

    /// Sentence-form context appended to prompts; empty when nothing is known
    pub fn context_block(&self) -> String {
        let mut parts = Vec::new();
        if let Some(album) = self.album.as_deref().filter(|a| !a.trim().is_empty()) {
            parts.push(format!("This photo is from the album \"{}\".", album.trim()));
        }
        if let Some(people) = self.people_sentence() {
            parts.push(people);
        }
        if let Some(location) = &self.location {
            parts.push(format!("This image was taken at {}.", location));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("\n\nContext: {}", parts.join(" "))
        }
    }

    fn value(&self, key: &str) -> Option<String> {
        let value = match key {
            "location" => self.location.clone().unwrap_or_default(),
            "people" => join_names(&self.people),
            "date" => self.date.clone().unwrap_or_default(),
            "album" => self.album.clone().unwrap_or_default(),
            "context" => self.context_block(),
            _ => return None,
        };
        Some(value)
    }
}

/// Substitute known placeholders in `template`.
///
/// Templates without `{context}` get the context block appended so the model
/// always sees what is known.
pub fn render(template: &str, context: &PromptContext) -> String {
    let mut out = String::with_capacity(template.len() + 128);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| context.value(&after[..close]).map(|v| (close, v))) {
            Some((close, value)) => {
                out.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    if !template.contains("{context}") {
        out.push_str(&context.context_block());
    }
    out.trim_end().to_string()
}
