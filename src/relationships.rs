// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Relationship labels between known people
//!
//! Only direct edges from the relationships file are honored; nothing is
//! inferred from chains of edges.
//!
//! ```yaml
//! relationships:
//!   - [John_Doe, Jane_Smith, spouse]
//!   - { from: John_Doe, to: Sam_Doe, label: father, possessive: his }
//! groups:
//!   - members: [John_Doe, Jane_Smith, Sam_Doe]
//!     description: the Doe family
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

use crate::faces::{display_name, first_name};
use crate::{Result, SmugvisionError};

/// Directed label from one person to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipEdge {
    pub from: String,
    pub to: String,
    pub label: String,
    /// Possessive used when phrasing the edge; "their" when unset
    pub possessive: Option<String>,
}

impl RelationshipEdge {
    /// Caption phrasing such as "John with his spouse Jane"
    pub fn phrase(&self) -> String {
        format!(
            "{} with {} {} {}",
            first_name(&self.from),
            self.possessive.as_deref().unwrap_or("their"),
            self.label,
            first_name(&self.to)
        )
    }
}

/// A named set of people described together when exactly they appear
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub members: BTreeSet<String>,
    pub description: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EdgeRecord {
    Triple(Vec<String>),
    Full {
        from: String,
        to: String,
        label: String,
        #[serde(default)]
        possessive: Option<String>,
    },
}

#[derive(Deserialize)]
struct GroupRecord {
    #[serde(default)]
    members: Vec<String>,
    description: Option<String>,
}

#[derive(Deserialize, Default)]
struct RelationshipsFile {
    #[serde(default)]
    relationships: Vec<EdgeRecord>,
    #[serde(default)]
    groups: Vec<GroupRecord>,
}

/// All configured relationships and groups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipGraph {
    edges: Vec<RelationshipEdge>,
    groups: Vec<Group>,
}

impl RelationshipGraph {
    pub fn new(edges: Vec<RelationshipEdge>, groups: Vec<Group>) -> Self {
        Self { edges, groups }
    }

    /// Parse YAML; names may be given in either display or underscore form
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: RelationshipsFile = serde_yaml::from_str(content).map_err(|e| {
            SmugvisionError::Config(format!("Failed to parse relationships file: {}", e))
        })?;

        let mut edges = Vec::with_capacity(file.relationships.len());
        for (index, record) in file.relationships.into_iter().enumerate() {
            let edge = match record {
                EdgeRecord::Triple(parts) => match parts.as_slice() {
                    [from, to, label] => RelationshipEdge {
                        from: display_name(from),
                        to: display_name(to),
                        label: label.trim().to_string(),
                        possessive: None,
                    },
                    _ => {
                        return Err(SmugvisionError::Config(format!(
                            "Relationship at index {}: expected [person, person, label], got {} items",
                            index,
                            parts.len()
                        )))
                    }
                },
                EdgeRecord::Full { from, to, label, possessive } => RelationshipEdge {
                    from: display_name(&from),
                    to: display_name(&to),
                    label: label.trim().to_string(),
                    possessive,
                },
            };
            if edge.from.is_empty() || edge.to.is_empty() || edge.label.is_empty() {
                return Err(SmugvisionError::Config(format!(
                    "Relationship at index {}: person names and label must not be empty",
                    index
                )));
            }
            edges.push(edge);
        }

        let groups = file
            .groups
            .into_iter()
            .filter_map(|g| {
                let description = g.description?.trim().to_string();
                let members: BTreeSet<String> = g.members.iter().map(|m| display_name(m)).collect();
                (!members.is_empty() && !description.is_empty()).then_some(Group { members, description })
            })
            .collect();

        Ok(Self { edges, groups })
    }

    /// Load from a file; a missing file means no relationships
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Relationships file not found: {:?}", path);
            return Ok(Self::default());
        }
        let graph = Self::parse(&std::fs::read_to_string(path)?)?;
        info!(
            "Loaded {} relationships and {} groups from {:?}",
            graph.edges.len(),
            graph.groups.len(),
            path
        );
        Ok(graph)
    }

    pub fn edges(&self) -> &[RelationshipEdge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.groups.is_empty()
    }

    fn edge(&self, from: &str, to: &str) -> Option<&RelationshipEdge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    /// The edge to phrase for exactly two people.
    ///
    /// Both directions are checked; the edge leaving the alphabetically first
    /// name wins so output does not depend on detection order.
    pub fn pair_edge(&self, people: &[String]) -> Option<&RelationshipEdge> {
        let unique: Vec<&str> = people
            .iter()
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if unique.len() != 2 {
            return None;
        }
        let (first, second) = (unique[0], unique[1]);
        self.edge(first, second).or_else(|| self.edge(second, first))
    }

    /// Labels between co-occurring people, keyed by (person, relative-to)
    pub fn describe(&self, people: &[String]) -> BTreeMap<(String, String), String> {
        let present: BTreeSet<&str> = people.iter().map(String::as_str).collect();
        if present.len() < 2 {
            return BTreeMap::new();
        }

        if present.len() == 2 {
            return self
                .pair_edge(people)
                .map(|e| ((e.from.clone(), e.to.clone()), e.label.clone()))
                .into_iter()
                .collect();
        }

        self.edges
            .iter()
            .filter(|e| present.contains(e.from.as_str()) && present.contains(e.to.as_str()))
            .map(|e| ((e.from.clone(), e.to.clone()), e.label.clone()))
            .collect()
    }

    /// Caption phrase for a pair with a defined edge
    pub fn phrase(&self, people: &[String]) -> Option<String> {
        self.pair_edge(people).map(RelationshipEdge::phrase)
    }

    /// Description of a group whose members are exactly `people`
    pub fn group_description(&self, people: &[String]) -> Option<&str> {
        let present: BTreeSet<String> = people.iter().cloned().collect();
        self.groups
            .iter()
            .find(|g| g.members == present)
            .map(|g| g.description.as_str())
    }

    /// Context for the captioning prompt: the group description if one
    /// matches, otherwise the direct relationships among the people.
    pub fn prompt_context(&self, people: &[String]) -> Option<String> {
        if let Some(description) = self.group_description(people) {
            return Some(description.to_string());
        }
        let relations = self.describe(people);
        if relations.is_empty() {
            return None;
        }
        Some(
            relations
                .iter()
                .map(|((from, to), label)| format!("{} is the {} of {}", to, label, from))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
