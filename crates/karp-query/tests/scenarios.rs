//! End-to-end compile + execute scenarios against a small fixture dataset.

use std::collections::BTreeSet;

use karp_core::entry::Entry;
use karp_core::error::QueryError;
use karp_core::resource::ResourceConfig;
use karp_index::MemoryIndex;
use karp_parser::{parse, Literal, Operator};
use karp_query::{ElasticEmitter, FilterEmitter, QueryCompiler, QueryRequest, SearchExecutor};
use proptest::prelude::*;
use serde_json::json;

const LEXICON: &str = r#"{
    "resource_id": "lexicon",
    "fields": {
        "wf": {"type": "string"},
        "name": {"type": "string"},
        "description": {"type": "long_string"},
        "population": {"type": "number"},
        "pos": {"type": "string", "collection": true},
        "senses": {
            "type": "object",
            "collection": true,
            "fields": {"id": {"type": "string"}, "primary": {"type": "boolean"}}
        }
    },
    "sort": "wf"
}"#;

fn fixture() -> MemoryIndex {
    let mut index = MemoryIndex::new();
    index
        .create_index(&ResourceConfig::from_json(LEXICON).unwrap())
        .unwrap();
    index
        .add_entries([
            Entry::new(
                "e1",
                "lexicon",
                json!({"wf": "sitta", "population": 150, "pos": ["vb"],
                       "description": "to be seated",
                       "senses": [{"id": "sitta..1", "primary": true}]}),
            ),
            Entry::new(
                "e2",
                "lexicon",
                json!({"wf": "satt", "population": 100, "pos": ["vb", "pc"]}),
            ),
            Entry::new("e3", "lexicon", json!({"wf": "sutta", "population": 201})),
            Entry::new(
                "e4",
                "lexicon",
                json!({"wf": "grund", "name": "Grund test", "population": 99.5,
                       "senses": [{"id": "grund..1", "primary": false}, {"id": "grund..2"}]}),
            ),
            Entry::new("e5", "lexicon", json!({"wf": "test", "name": "Grund"})),
        ])
        .unwrap();
    index
}

fn hits(index: &MemoryIndex, q: &str) -> BTreeSet<String> {
    let request = QueryRequest::new(["lexicon"]).with_query(q).paginate(0, 100);
    let compiled = QueryCompiler::new(index, FilterEmitter)
        .compile(&request)
        .unwrap_or_else(|e| panic!("{q}: {e}"));
    index
        .execute(&compiled)
        .unwrap()
        .hits
        .iter()
        .map(|h| h.id.clone())
        .collect()
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn analyzed_equals_requires_every_term() {
    let index = fixture();
    let compiled = QueryCompiler::new(&index, ElasticEmitter)
        .compile(&QueryRequest::new(["lexicon"]).with_query("equals|name|Grund test"))
        .unwrap();
    assert_eq!(
        compiled.query,
        json!({"match": {"name": {"query": "Grund test", "operator": "and"}}})
    );
    assert_eq!(hits(&index, "equals|name|Grund test"), set(&["e4"]));
    assert_eq!(hits(&index, "equals|name|grund"), set(&["e4", "e5"]));
}

#[test]
fn exists_and_missing_same_field_never_match() {
    let index = fixture();
    for field in ["name", "description", "senses.id", "pos", "wf"] {
        let q = format!("and||exists|{field}||missing|{field}");
        assert!(hits(&index, &q).is_empty(), "{q}");
    }
}

#[test]
fn range_is_inclusive_on_both_ends() {
    let index = fixture();
    assert_eq!(hits(&index, "range|population|100|200"), set(&["e1", "e2"]));
    assert_eq!(hits(&index, "gt|population|100"), set(&["e1", "e3"]));
    assert_eq!(hits(&index, "lt|population|100"), set(&["e4"]));
    assert_eq!(hits(&index, "lte|population|99.5"), set(&["e4"]));
}

#[test]
fn regexp_parses_to_binary_node_of_strings() {
    let ast = parse("regexp|field|str.*ng").unwrap();
    let root = ast.root.unwrap();
    assert_eq!(root.operator_kind(), Some(Operator::Regexp));
    assert_eq!(root.arity(), 2);
    let children: Vec<_> = root.children().map(|c| c.as_literal().cloned()).collect();
    assert_eq!(
        children,
        vec![
            Some(Literal::String("field".to_string())),
            Some(Literal::String("str.*ng".to_string()))
        ]
    );
}

#[test]
fn sorting_by_long_string_names_field_and_resource() {
    let index = fixture();
    let err = QueryCompiler::new(&index, FilterEmitter)
        .compile(&QueryRequest::new(["lexicon"]).with_sort("description"))
        .unwrap_err();
    assert_eq!(err, QueryError::unsupported_field("description", "lexicon"));
    assert_eq!(err.http_status(), 400);
}

#[test]
fn negated_equality_excludes_the_neighbour() {
    let index = fixture();
    assert_eq!(
        hits(&index, "and||equals|wf|sitta||not||equals|wf|satt"),
        set(&["e1"])
    );
}

#[test]
fn substring_operators_on_raw_values() {
    let index = fixture();
    assert_eq!(hits(&index, "startswith|wf|s"), set(&["e1", "e2", "e3"]));
    assert_eq!(hits(&index, "endswith|wf|tta"), set(&["e1", "e3"]));
    assert_eq!(hits(&index, "contains|name|nd t"), set(&["e4"]));
    assert_eq!(hits(&index, "contains|senses.id|.."), set(&["e1", "e4"]));
}

#[test]
fn nested_and_collection_fields() {
    let index = fixture();
    assert_eq!(hits(&index, "equals|pos|pc"), set(&["e2"]));
    assert_eq!(hits(&index, "equals|senses.primary|true"), set(&["e1"]));
    assert_eq!(hits(&index, "missing|senses"), set(&["e2", "e3", "e5"]));
}

#[test]
fn free_text_and_free_regexp() {
    let index = fixture();
    assert_eq!(hits(&index, "freetext|sutta"), set(&["e1", "e3"]));
    assert_eq!(hits(&index, "freergxp|s.tt"), set(&["e2"]));
    assert_eq!(hits(&index, "regexp|gr.*"), set(&["e4", "e5"]));
}

#[test]
fn flat_and_nested_chains_agree() {
    let index = fixture();
    let (a, b, c) = ("exists|pos", "gte|population|100", "startswith|wf|s");
    let flat = hits(&index, &format!("and||{a}||{b}||{c}"));
    let nested = hits(&index, &format!("and||and||{a}||{b}||{c}"));
    assert_eq!(flat, nested);
    assert_eq!(flat, set(&["e1", "e2"]));

    let flat = hits(&index, &format!("or||{a}||{b}||{c}"));
    let nested = hits(&index, &format!("or||or||{a}||{b}||{c}"));
    assert_eq!(flat, nested);
}

#[test]
fn double_negation_is_identity() {
    let index = fixture();
    for q in ["equals|wf|sitta", "exists|name", "range|population|100|200", "freetext|grund"] {
        assert_eq!(hits(&index, &format!("not||not||{q}")), hits(&index, q), "{q}");
    }
}

#[test]
fn empty_query_matches_everything() {
    let index = fixture();
    assert_eq!(hits(&index, ""), set(&["e1", "e2", "e3", "e4", "e5"]));
}

fn arb_leaf() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("equals|wf|sitta"),
        Just("equals|name|grund"),
        Just("equals|pos|vb"),
        Just("contains|wf|tt"),
        Just("startswith|wf|s"),
        Just("exists|description"),
        Just("missing|senses"),
        Just("range|population|100|200"),
        Just("gt|population|100"),
        Just("freetext|satt"),
        Just("regexp|wf|s.*a"),
    ]
    .prop_map(str::to_string)
}

fn arb_query(depth: u32) -> BoxedStrategy<String> {
    if depth == 0 {
        return arb_leaf().boxed();
    }
    prop_oneof![
        arb_leaf(),
        arb_query(depth - 1).prop_map(|q| format!("not||{q}")),
        (prop_oneof![Just("and"), Just("or")], arb_query(depth - 1), arb_query(depth - 1))
            .prop_map(|(op, l, r)| format!("{op}||{l}||{r}")),
    ]
    .boxed()
}

proptest! {
    #[test]
    fn compiling_is_idempotent(q in arb_query(3)) {
        let index = fixture();
        let request = QueryRequest::new(["lexicon"]).with_query(q);
        let es = QueryCompiler::new(&index, ElasticEmitter);
        prop_assert_eq!(es.compile(&request).unwrap(), es.compile(&request).unwrap());
        let filters = QueryCompiler::new(&index, FilterEmitter);
        prop_assert_eq!(filters.compile(&request).unwrap(), filters.compile(&request).unwrap());
    }

    #[test]
    fn double_negation_matches_same_entries(q in arb_query(2)) {
        let index = fixture();
        prop_assert_eq!(hits(&index, &format!("not||not||{q}")), hits(&index, &q));
    }
}
