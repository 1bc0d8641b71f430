//! Naming-convention heuristics for relationship inference.
//!
//! Each rule matches a column name against candidate target tables:
//! `customer_id -> customers.id`, `fk_order_id -> orders.id`, a column
//! matching another table's primary key, and so on. Matches carry a base
//! confidence that later combines with join statistics.

use std::collections::{HashMap, HashSet};

use inflector::Inflector;

/// A successful match from a naming rule.
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub target_table: String,
    pub target_column: String,
    /// Base confidence from the rule.
    pub base_confidence: f64,
    /// The rule that matched.
    pub rule: &'static str,
}

/// Table lookup structures used by the rules.
#[derive(Debug, Default)]
pub struct NamingRules {
    /// Lowercase table names.
    tables: HashSet<String>,
    /// Lowercase table name -> primary key columns.
    pk_columns: HashMap<String, Vec<String>>,
}

impl NamingRules {
    /// Build lookups from (table name, pk columns) pairs.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<String>)>,
        S: Into<String>,
    {
        let mut rules = Self::default();
        for (name, pks) in tables {
            let name = name.into().to_lowercase();
            rules.tables.insert(name.clone());
            rules.pk_columns.insert(name, pks);
        }
        rules
    }

    /// Run all rules against a column name, strongest match first.
    pub fn matches(&self, column_name: &str) -> Vec<NameMatch> {
        let col = column_name.to_lowercase();
        let mut matches = Vec::new();

        matches.extend(self.match_fk_prefix(&col));
        matches.extend(self.match_suffix(&col, "_id", "id", 0.85));
        matches.extend(self.match_suffix(&col, "_key", "key", 0.80));
        matches.extend(self.match_suffix(&col, "_code", "code", 0.75));
        matches.extend(self.match_pk(&col));

        matches.sort_by(|a, b| {
            b.base_confidence
                .partial_cmp(&a.base_confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.dedup_by(|a, b| a.target_table == b.target_table && a.target_column == b.target_column);
        matches
    }

    /// Best single match, if any.
    pub fn best_match(&self, column_name: &str) -> Option<NameMatch> {
        self.matches(column_name).into_iter().next()
    }

    /// `fk_customer_id -> customers.id`
    fn match_fk_prefix(&self, col: &str) -> Vec<NameMatch> {
        let Some(rest) = col.strip_prefix("fk_") else {
            return vec![];
        };
        let Some(base) = rest.strip_suffix("_id") else {
            return vec![];
        };

        let mut matches = vec![];
        for table in [pluralize(base), base.to_string()] {
            if self.tables.contains(&table) {
                matches.push(NameMatch {
                    target_table: table,
                    target_column: "id".to_string(),
                    base_confidence: 0.90,
                    rule: "fk_prefix",
                });
            }
        }
        matches
    }

    /// `customer_id -> customers.id` (and singular table names at a small
    /// discount).
    fn match_suffix(
        &self,
        col: &str,
        suffix: &str,
        target_column: &str,
        base_confidence: f64,
    ) -> Vec<NameMatch> {
        let Some(base) = col.strip_suffix(suffix) else {
            return vec![];
        };
        if base.is_empty() {
            return vec![];
        }

        let mut matches = vec![];

        let plural = pluralize(base);
        if self.tables.contains(&plural) {
            matches.push(NameMatch {
                target_table: plural,
                target_column: target_column.to_string(),
                base_confidence,
                rule: "suffix",
            });
        }
        if self.tables.contains(base) {
            matches.push(NameMatch {
                target_table: base.to_string(),
                target_column: target_column.to_string(),
                // Slightly lower confidence for singular table names
                base_confidence: base_confidence * 0.95,
                rule: "suffix",
            });
        }
        matches
    }

    /// Column name equals another table's primary key column.
    fn match_pk(&self, col: &str) -> Vec<NameMatch> {
        let mut matches = vec![];
        for (table, pks) in &self.pk_columns {
            for pk in pks {
                if pk.to_lowercase() == col {
                    matches.push(NameMatch {
                        target_table: table.clone(),
                        target_column: pk.clone(),
                        base_confidence: 0.65,
                        rule: "pk_match",
                    });
                }
            }
        }
        matches
    }
}

/// Similarity between a referencing column name and its supposed target.
///
/// 1.0 for an exact `<table>_id` style match, decreasing through
/// singular/plural agreement and containment down to 0.0 for unrelated
/// names.
pub fn name_similarity(source_column: &str, target_table: &str, target_column: &str) -> f64 {
    let col = source_column.to_lowercase();
    let table = target_table.to_lowercase();

    let base = col
        .trim_end_matches("_id")
        .trim_end_matches("_key")
        .trim_end_matches("_code")
        .trim_end_matches("_fk");

    if base == table || pluralize(base) == table || base == singularize(&table) {
        return 1.0;
    }
    if col == target_column.to_lowercase() {
        return 0.85;
    }
    if base.ends_with(&singularize(&table)) || base.ends_with(table.as_str()) {
        // Role-prefixed reference (host_user_id -> users)
        return 0.75;
    }
    if col.contains(&singularize(&table)) {
        return 0.55;
    }

    // Token overlap fallback over snake_case parts
    let col_tokens: HashSet<&str> = base.split('_').filter(|t| !t.is_empty()).collect();
    let table_tokens: HashSet<String> = table
        .split('_')
        .filter(|t| !t.is_empty())
        .map(|t| singularize(t))
        .collect();
    if col_tokens.is_empty() || table_tokens.is_empty() {
        return 0.0;
    }
    let shared = col_tokens
        .iter()
        .filter(|t| table_tokens.contains(&singularize(t)))
        .count();
    shared as f64 / col_tokens.len().max(table_tokens.len()) as f64 * 0.5
}

/// Irregular plurals the inflector crate handles poorly in schema names.
static IRREGULARS: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("status", "statuses"),
    ("address", "addresses"),
    ("category", "categories"),
    ("company", "companies"),
    ("country", "countries"),
    ("currency", "currencies"),
    ("index", "indices"),
    ("medium", "media"),
];

/// Pluralize a word, handling schema-common irregulars first.
pub fn pluralize(word: &str) -> String {
    for (singular, plural) in IRREGULARS {
        if word == *singular {
            return (*plural).to_string();
        }
    }
    word.to_plural()
}

/// Singularize a word, handling schema-common irregulars first.
pub fn singularize(word: &str) -> String {
    for (singular, plural) in IRREGULARS {
        if word == *plural {
            return (*singular).to_string();
        }
    }
    word.to_singular()
}
