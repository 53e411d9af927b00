//! Result formatting: JSON, Table, and Markdown output.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use karp_core::entry::Entry;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
    Markdown,
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub resource: String,
    pub version: u64,
    pub last_modified: f64,
    pub last_modified_by: String,
    pub entry: serde_json::Value,
}

impl From<&Entry> for Hit {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id.clone(),
            resource: entry.resource_id.clone(),
            version: entry.version,
            last_modified: entry.last_modified,
            last_modified_by: entry.last_modified_by.clone(),
            entry: entry.entry.clone(),
        }
    }
}

/// Hits as one list, or grouped by resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hits {
    Flat(Vec<Hit>),
    Split(BTreeMap<String, Vec<Hit>>),
}

impl Hits {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Hit> + '_> {
        match self {
            Self::Flat(hits) => Box::new(hits.iter()),
            Self::Split(groups) => Box::new(groups.values().flatten()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A complete search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub hits: Hits,
    /// Number of matching entries before pagination.
    pub total: usize,
    /// Matching entries per resource, when lexicon stats were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<BTreeMap<String, usize>>,
}

/// One row of a field statistics result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValueCount {
    pub value: String,
    pub count: usize,
}

/// Format query results in the specified output format.
#[must_use]
pub fn format_results(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(result),
        OutputFormat::Table => format_table(result),
        OutputFormat::Markdown => format_markdown(result),
    }
}

fn format_json(result: &QueryResult) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
}

/// `resource`, `id`, then every top-level entry key that occurs in any hit.
fn columns(result: &QueryResult) -> Vec<String> {
    let keys: BTreeSet<&String> = result
        .hits
        .iter()
        .filter_map(|hit| hit.entry.as_object())
        .flat_map(|fields| fields.keys())
        .collect();
    ["resource", "id"]
        .into_iter()
        .map(str::to_string)
        .chain(keys.into_iter().cloned())
        .collect()
}

fn cell(hit: &Hit, column: &str) -> String {
    match column {
        "resource" => hit.resource.clone(),
        "id" => hit.id.clone(),
        key => hit.entry.get(key).map_or_else(String::new, value_to_display),
    }
}

fn format_table(result: &QueryResult) -> String {
    if result.hits.is_empty() {
        return "(no results)".to_string();
    }

    let columns = columns(result);
    let rows: Vec<Vec<String>> = result
        .hits
        .iter()
        .map(|hit| columns.iter().map(|c| cell(hit, c)).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &rows {
        for (i, value) in row.iter().enumerate() {
            widths[i] = widths[i].max(value.chars().count());
        }
    }

    let mut output = String::new();
    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    output.push_str(&header.join(" | "));
    output.push('\n');

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&sep.join("-+-"));
    output.push('\n');

    for row in &rows {
        let vals: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{:width$}", v, width = widths[i]))
            .collect();
        output.push_str(vals.join(" | ").trim_end());
        output.push('\n');
    }

    output.push_str(&format!("({} of {} hits)\n", rows.len(), result.total));
    output
}

fn format_markdown(result: &QueryResult) -> String {
    if result.hits.is_empty() {
        return "*No results*\n".to_string();
    }

    let columns = columns(result);
    let mut output = String::new();

    output.push_str("| ");
    output.push_str(&columns.join(" | "));
    output.push_str(" |\n");

    output.push_str("| ");
    let seps: Vec<&str> = columns.iter().map(|_| "---").collect();
    output.push_str(&seps.join(" | "));
    output.push_str(" |\n");

    for hit in result.hits.iter() {
        output.push_str("| ");
        let vals: Vec<String> = columns
            .iter()
            .map(|c| cell(hit, c).replace('|', "\\|"))
            .collect();
        output.push_str(&vals.join(" | "));
        output.push_str(" |\n");
    }

    output
}

fn value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: &str, resource: &str, entry: serde_json::Value) -> Hit {
        Hit::from(&Entry::new(id, resource, entry))
    }

    fn sample_result() -> QueryResult {
        QueryResult {
            hits: Hits::Flat(vec![
                hit("1", "saldo", json!({"baseform": "sitta", "pos": "vb"})),
                hit("2", "saldo", json!({"baseform": "satt|a", "senses": ["s1", "s2"]})),
            ]),
            total: 7,
            distribution: Some(BTreeMap::from([("saldo".to_string(), 7)])),
        }
    }

    #[test]
    fn format_as_json() {
        let output = format_results(&sample_result(), OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["total"], 7);
        assert_eq!(parsed["hits"][0]["entry"]["baseform"], "sitta");
        assert_eq!(parsed["distribution"]["saldo"], 7);
    }

    #[test]
    fn split_hits_serialize_as_object() {
        let result = QueryResult {
            hits: Hits::Split(BTreeMap::from([(
                "saldo".to_string(),
                vec![hit("1", "saldo", json!({}))],
            )])),
            total: 1,
            distribution: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["hits"]["saldo"][0]["id"], "1");
        assert!(value.get("distribution").is_none());
        assert_eq!(result.hits.len(), 1);
    }

    #[test]
    fn format_as_table() {
        let output = format_results(&sample_result(), OutputFormat::Table);
        let mut lines = output.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("resource | id | baseform"));
        assert!(header.contains("senses"));
        assert!(output.contains("---"));
        assert!(output.contains("[\"s1\",\"s2\"]"));
        assert!(output.ends_with("(2 of 7 hits)\n"));
    }

    #[test]
    fn format_as_markdown_escapes_pipes() {
        let output = format_results(&sample_result(), OutputFormat::Markdown);
        assert!(output.starts_with("| resource | id | baseform | pos | senses |\n"));
        assert!(output.contains("| --- |"));
        assert!(output.contains("satt\\|a"));
    }

    #[test]
    fn format_empty_result() {
        let result = QueryResult {
            hits: Hits::Flat(vec![]),
            total: 0,
            distribution: None,
        };
        assert_eq!(format_results(&result, OutputFormat::Table), "(no results)");
        assert_eq!(format_results(&result, OutputFormat::Markdown), "*No results*\n");
    }
}
