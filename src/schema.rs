//! Static schema catalog: tables, columns and relationships.
//!
//! The catalog is constructed once at process start and never mutated
//! afterwards; every pipeline component reads it. Categorical columns carry
//! a closed set of distinct values used for entity grounding; the set can
//! be declared statically or hydrated from live storage before the catalog
//! is shared.

use crate::error::{AskError, Result};
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipKind::ManyToOne => write!(f, "ManyToOne"),
            RelationshipKind::OneToMany => write!(f, "OneToMany"),
            RelationshipKind::ManyToMany => write!(f, "ManyToMany"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub to_table: String,
    pub kind: RelationshipKind,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Closed value domain for categorical columns; `None` for free-text
    /// and numeric columns, which are never fuzzy-matched.
    #[serde(default)]
    pub distinct_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns carrying a non-empty closed value domain.
    pub fn enumerated_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns
            .iter()
            .filter(|c| c.distinct_values.as_ref().map_or(false, |v| !v.is_empty()))
    }
}

/// Ordered, read-only table registry. Iteration order is declaration order;
/// the first table doubles as the deterministic fallback for unresolved
/// table selections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaCatalog {
    tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let catalog: SchemaCatalog = serde_json::from_str(&text)?;
        if catalog.tables.is_empty() {
            return Err(AskError::Schema(format!(
                "catalog at {} contains no tables",
                path.display()
            )));
        }
        Ok(catalog)
    }

    pub fn get_table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn first_table(&self) -> Option<&TableSchema> {
        self.tables.first()
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn relationships_for(&self, table: &str) -> Vec<&Relationship> {
        self.tables
            .iter()
            .flat_map(|t| t.relationships.iter())
            .filter(|r| r.from_table == table || r.to_table == table)
            .collect()
    }

    /// Refresh the closed value domains of categorical columns from live
    /// storage. Per-column failures are logged and skipped so a partially
    /// reachable database still yields a usable catalog.
    pub fn hydrate_distinct_values(&mut self, storage: &Storage) {
        for table in &mut self.tables {
            for column in &mut table.columns {
                if column.distinct_values.is_none() {
                    continue;
                }
                match storage.distinct_values(&table.name, &column.name) {
                    Ok(values) if !values.is_empty() => {
                        column.distinct_values = Some(values);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            "could not hydrate {}.{}: {}",
                            table.name, column.name, e
                        );
                    }
                }
            }
        }
    }

    /// The built-in learning-analytics catalog.
    pub fn builtin() -> Self {
        let institution = TableSchema {
            name: "Institution".to_string(),
            columns: vec![
                col("id", "int", "primary key"),
                col("name", "str", "official institution name"),
                col_enum(
                    "type",
                    "str",
                    "institution category",
                    &[
                        "Public University",
                        "Private University-State",
                        "Private University-Deemed to be",
                        "Autonomous College",
                        "Affiliated College",
                        "Unknown",
                    ],
                ),
                col("district", "str", "district the institution belongs to"),
            ],
            relationships: vec![],
        };

        let course = TableSchema {
            name: "Course".to_string(),
            columns: vec![
                col("id", "int", "primary key"),
                col("name", "str", "course title"),
                col_enum(
                    "category",
                    "str",
                    "subject area of the course",
                    &["Programming", "Data Science", "Design", "Business"],
                ),
                col("knowledge_partner", "str", "partner organization offering the course"),
            ],
            relationships: vec![],
        };

        let learner = TableSchema {
            name: "Learner".to_string(),
            columns: vec![
                col("id", "int", "primary key"),
                col("name", "str", "full name of the learner"),
                col_enum("gender", "str", "learner gender", &["male", "female", "other"]),
                col("email", "str", "contact email"),
                col("institution_id", "int", "references Institution.id"),
                col_enum(
                    "employment_status",
                    "str",
                    "employment status after graduation",
                    &["Employed", "Unemployed", "Studying", "Unknown"],
                ),
            ],
            relationships: vec![Relationship {
                from_table: "Learner".to_string(),
                to_table: "Institution".to_string(),
                kind: RelationshipKind::ManyToOne,
                description: "each learner belongs to one institution".to_string(),
            }],
        };

        let enrollment = TableSchema {
            name: "Enrollment".to_string(),
            columns: vec![
                col("id", "int", "primary key"),
                col("learner_id", "int", "references Learner.id"),
                col("course_id", "int", "references Course.id"),
                col_enum(
                    "status",
                    "str",
                    "current enrollment state",
                    &["Active", "Completed", "Dropped"],
                ),
                col("score", "float", "final assessment score, 0-100"),
                col("completed_at", "str", "completion date, ISO 8601"),
            ],
            relationships: vec![
                Relationship {
                    from_table: "Enrollment".to_string(),
                    to_table: "Learner".to_string(),
                    kind: RelationshipKind::ManyToOne,
                    description: "each enrollment belongs to one learner".to_string(),
                },
                Relationship {
                    from_table: "Enrollment".to_string(),
                    to_table: "Course".to_string(),
                    kind: RelationshipKind::ManyToOne,
                    description: "each enrollment targets one course".to_string(),
                },
            ],
        };

        Self::new(vec![learner, enrollment, course, institution])
    }
}

fn col(name: &str, data_type: &str, description: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        data_type: data_type.to_string(),
        description: Some(description.to_string()),
        distinct_values: None,
    }
}

fn col_enum(name: &str, data_type: &str, description: &str, values: &[&str]) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        data_type: data_type.to_string(),
        description: Some(description.to_string()),
        distinct_values: Some(values.iter().map(|v| v.to_string()).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_lookup() {
        let catalog = SchemaCatalog::builtin();
        assert!(catalog.get_table("Learner").is_some());
        assert!(catalog.get_table("NoSuchTable").is_none());
        assert_eq!(catalog.first_table().unwrap().name, "Learner");
    }

    #[test]
    fn enumerated_columns_skip_free_text() {
        let catalog = SchemaCatalog::builtin();
        let learner = catalog.get_table("Learner").unwrap();
        let enumerated: Vec<&str> = learner
            .enumerated_columns()
            .map(|c| c.name.as_str())
            .collect();
        assert!(enumerated.contains(&"gender"));
        assert!(!enumerated.contains(&"name"));
        assert!(!enumerated.contains(&"id"));
    }

    #[test]
    fn relationships_cover_both_directions() {
        let catalog = SchemaCatalog::builtin();
        let rels = catalog.relationships_for("Learner");
        assert!(rels
            .iter()
            .any(|r| r.from_table == "Enrollment" && r.to_table == "Learner"));
        assert!(rels
            .iter()
            .any(|r| r.from_table == "Learner" && r.to_table == "Institution"));
    }

    #[test]
    fn catalog_roundtrips_through_json() {
        let catalog = SchemaCatalog::builtin();
        let json = serde_json::to_string(&catalog).unwrap();
        let parsed: SchemaCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.table_names(), catalog.table_names());
    }
}
