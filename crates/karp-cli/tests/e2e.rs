//! End-to-end tests for the Karp CLI.
//!
//! Tests invoke the `karp` binary as a subprocess and verify its output.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const SALDO: &str = r#"{
    "resource_id": "saldo",
    "fields": {
        "baseform": {"type": "string"},
        "pos": {"type": "string", "collection": true},
        "freq": {"type": "integer"},
        "gloss": {"type": "long_string"}
    },
    "sort": "baseform"
}"#;

const PLACES: &str = r#"{
    "resource_id": "places",
    "fields": {
        "name": {"type": "string"},
        "population": {"type": "integer"}
    }
}"#;

const ENTRIES: &str = r#"{"id": "s1", "resource": "saldo", "entry": {"baseform": "sitta", "pos": ["vb"], "freq": 40}}
{"id": "s2", "resource": "saldo", "entry": {"baseform": "satt", "pos": ["vb", "pc"], "freq": 10}}

{"id": "s3", "resource": "saldo", "entry": {"baseform": "sutta", "freq": 3}}
{"id": "p1", "resource": "places", "entry": {"name": "Sitta by", "population": 201}}
"#;

fn karp_in(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_karp"));
    cmd.current_dir(dir)
        .arg("--resources-dir")
        .arg(dir.join("resources"))
        .env_remove("KARP_LOG")
        .env_remove("RUST_LOG");
    cmd
}

/// A workspace with two resource configs and an entries file, but no
/// `karp.toml`, so the defaults apply.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let resources = dir.path().join("resources");
    std::fs::create_dir(&resources).unwrap();
    std::fs::write(resources.join("saldo.json"), SALDO).unwrap();
    std::fs::write(resources.join("places.json"), PLACES).unwrap();
    std::fs::write(resources.join("notes.txt"), "not a resource").unwrap();
    std::fs::write(dir.path().join("entries.jsonl"), ENTRIES).unwrap();
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    karp_in(dir).args(args).output().unwrap()
}

fn success(dir: &Path, args: &[&str]) -> String {
    let output = run(dir, args);
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn success_json(dir: &Path, args: &[&str]) -> serde_json::Value {
    serde_json::from_str(&success(dir, args)).unwrap()
}

// === parse ===

#[test]
fn e2e_parse_prints_tree() {
    let dir = workspace();
    let stdout = success(dir.path(), &["parse", "and||equals|baseform|sitta||exists|pos"]);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "and");
    assert_eq!(lines[1].trim(), "equals");
    assert!(lines[1].starts_with("  "));
    assert!(stdout.contains("sitta"));
    assert!(stdout.contains("exists"));
}

#[test]
fn e2e_parse_json_and_empty_query() {
    let dir = workspace();
    let ast = success_json(dir.path(), &["parse", "--json", "freetext|sitta"]);
    assert_eq!(ast["root"]["kind"]["op"], "free_text");
    assert_eq!(ast["root"]["arity"], 1);

    let stdout = success(dir.path(), &["parse", ""]);
    assert_eq!(stdout.trim(), "(empty query)");
}

#[test]
fn e2e_parse_error_reports_code() {
    let dir = workspace();
    let output = run(dir.path(), &["parse", "nosuchop|x"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error["), "{stderr}");
}

// === compile ===

#[test]
fn e2e_compile_es_body() {
    let dir = workspace();
    let body = success_json(dir.path(), &["compile", "equals|baseform|sitta", "-r", "saldo"]);
    assert_eq!(
        body["query"],
        serde_json::json!({"match": {"baseform": {"query": "sitta", "operator": "and"}}})
    );
    assert_eq!(body["from"], 0);
    assert_eq!(body["size"], 25);
    assert_eq!(body["sort"][0]["baseform.raw"]["order"], "asc");
    assert_eq!(body["aggs"]["distribution"]["terms"]["field"], "_index");
}

#[test]
fn e2e_compile_without_query_matches_all() {
    let dir = workspace();
    let body = success_json(
        dir.path(),
        &["c", "-r", "saldo", "-r", "places", "--size", "5", "--no-stats"],
    );
    assert_eq!(body["query"], serde_json::json!({"match_all": {}}));
    assert_eq!(body["size"], 5);
    assert!(body.get("aggs").is_none());
    assert!(body.get("sort").is_none(), "no default sort across resources");
}

#[test]
fn e2e_compile_unsupported_sort_fails() {
    let dir = workspace();
    let output = run(
        dir.path(),
        &["compile", "-r", "saldo", "--sort", "gloss|desc"],
    );
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[unsupported_field]"), "{stderr}");
    assert!(stderr.contains("gloss"));
}

#[test]
fn e2e_compile_unknown_resource_fails() {
    let dir = workspace();
    let output = run(dir.path(), &["compile", "-r", "nope"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error[unknown_resource]"));
}

#[test]
fn e2e_compile_msearch_has_one_search_per_resource() {
    let dir = workspace();
    let stdout = success(
        dir.path(),
        &["compile", "exists|name", "-r", "saldo", "-r", "places", "--split", "--backend", "msearch"],
    );
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["index"], "saldo");
    assert_eq!(lines[2]["index"], "places");
    assert_eq!(lines[1]["query"]["exists"]["field"], "name");
}

#[test]
fn e2e_compile_filter_backend() {
    let dir = workspace();
    let compiled = success_json(
        dir.path(),
        &["compile", "gte|freq|10", "-r", "saldo", "--backend", "filter"],
    );
    assert_eq!(compiled["query"]["range"]["field"], "freq");
    assert_eq!(compiled["query"]["range"]["bounds"]["gte"], 10);
    assert_eq!(compiled["resources"], serde_json::json!(["saldo"]));
}

// === search ===

#[test]
fn e2e_search_json() {
    let dir = workspace();
    let result = success_json(
        dir.path(),
        &["search", "startswith|baseform|s", "-r", "saldo", "--entries", "entries.jsonl"],
    );
    assert_eq!(result["total"], 3);
    let ids: Vec<&str> = result["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["s2", "s1", "s3"]);
    assert_eq!(result["distribution"]["saldo"], 3);
}

#[test]
fn e2e_search_multi_resource_sorted() {
    let dir = workspace();
    let result = success_json(
        dir.path(),
        &[
            "s",
            "freetext|sitta",
            "-r",
            "saldo",
            "-r",
            "places",
            "--entries",
            "entries.jsonl",
            "--size",
            "1",
        ],
    );
    assert_eq!(result["total"], 3);
    assert_eq!(result["hits"].as_array().unwrap().len(), 1);
    assert_eq!(result["distribution"]["places"], 1);
}

#[test]
fn e2e_search_table() {
    let dir = workspace();
    let stdout = success(
        dir.path(),
        &[
            "search",
            "equals|pos|pc",
            "-r",
            "saldo",
            "--entries",
            "entries.jsonl",
            "--format",
            "table",
        ],
    );
    assert!(stdout.starts_with("resource | id"));
    assert!(stdout.contains("satt"));
    assert!(stdout.trim_end().ends_with("(1 of 1 hits)"));

    let stdout = success(
        dir.path(),
        &[
            "search",
            "equals|baseform|nothing",
            "-r",
            "saldo",
            "--entries",
            "entries.jsonl",
            "--format",
            "table",
        ],
    );
    assert_eq!(stdout.trim(), "(no results)");
}

#[test]
fn e2e_search_rejects_bad_entries_line() {
    let dir = workspace();
    std::fs::write(dir.path().join("broken.jsonl"), "{\"id\": \"x\"\n").unwrap();
    let output = run(
        dir.path(),
        &["search", "-r", "saldo", "--entries", "broken.jsonl"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("broken.jsonl:1"));
}

// === stats, mapping, resources ===

#[test]
fn e2e_stats_counts_values() {
    let dir = workspace();
    let counts = success_json(
        dir.path(),
        &["stats", "-r", "saldo", "--field", "pos", "--entries", "entries.jsonl"],
    );
    assert_eq!(counts[0], serde_json::json!({"value": "vb", "count": 2}));
    assert_eq!(counts[1], serde_json::json!({"value": "pc", "count": 1}));
}

#[test]
fn e2e_stats_without_entries_prints_aggregation() {
    let dir = workspace();
    let body = success_json(dir.path(), &["stats", "-r", "saldo", "--field", "pos"]);
    assert_eq!(body["size"], 0);
    assert_eq!(body["aggs"]["field_values"]["terms"]["field"], "pos.raw");
}

#[test]
fn e2e_mapping_prints_es_mapping() {
    let dir = workspace();
    let mapping = success_json(dir.path(), &["mapping", "saldo"]);
    assert_eq!(mapping["dynamic"], false);
    assert_eq!(mapping["properties"]["baseform"]["type"], "text");
    assert_eq!(mapping["properties"]["baseform"]["fields"]["raw"]["type"], "keyword");
    assert_eq!(mapping["properties"]["freq"]["type"], "long");
}

#[test]
fn e2e_resources_lists_valid_configs() {
    let dir = workspace();
    std::fs::write(dir.path().join("resources").join("broken.json"), "{").unwrap();
    let stdout = success(dir.path(), &["resources"]);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["places", "saldo"]);
}

#[test]
fn e2e_completions_generate_script() {
    let dir = workspace();
    let stdout = success(dir.path(), &["completions", "bash"]);
    assert!(stdout.contains("karp"));
}
