use karp_parser::{parse, Ast, Node};
use proptest::prelude::*;

fn arb_word() -> impl Strategy<Value = String> {
    "[a-z][a-z ]{0,7}".prop_map(|s| s.trim_end().to_string())
}

fn arb_field() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("wf".to_string()),
        Just("baseform".to_string()),
        Just("senses.id".to_string()),
        "[a-z]{1,6}".prop_map(|s| s),
    ]
}

fn arb_leaf() -> impl Strategy<Value = String> {
    let binary = prop_oneof![
        Just("equals"),
        Just("contains"),
        Just("startswith"),
        Just("endswith"),
        Just("regexp"),
    ];
    let unary_field = prop_oneof![Just("exists"), Just("missing")];
    let unary_text = prop_oneof![Just("freetext"), Just("freergxp"), Just("regexp")];
    let bound = prop_oneof![Just("lt"), Just("lte"), Just("gt"), Just("gte")];

    prop_oneof![
        (binary, arb_field(), arb_word()).prop_map(|(op, f, v)| format!("{op}|{f}|{v}")),
        (unary_field, arb_field()).prop_map(|(op, f)| format!("{op}|{f}")),
        (unary_text, arb_word()).prop_map(|(op, v)| format!("{op}|{v}")),
        (bound, arb_field(), -1000i64..1000).prop_map(|(op, f, n)| format!("{op}|{f}|{n}")),
        (arb_field(), -1000i64..1000, 0i64..1000)
            .prop_map(|(f, lo, span)| format!("range|{f}|{lo}|{}", lo + span)),
        (arb_field(), 0u32..1000).prop_map(|(f, n)| format!("gte|{f}|{}.5", n)),
    ]
}

fn arb_expr(depth: u32) -> BoxedStrategy<String> {
    if depth == 0 {
        return arb_leaf().boxed();
    }

    let not = arb_expr(depth - 1).prop_map(|e| format!("not||{e}"));
    let binary = (
        prop_oneof![Just("and"), Just("or")],
        arb_expr(depth - 1),
        arb_expr(depth - 1),
    )
        .prop_map(|(op, lhs, rhs)| format!("{op}||{lhs}||{rhs}"));
    prop_oneof![arb_leaf(), not, binary].boxed()
}

fn assert_well_formed(ast: &Ast) {
    for node in ast.walk() {
        assert_eq!(node.arity(), node.children().count());
    }
}

proptest! {
    #[test]
    fn parsed_trees_are_well_formed(query in arb_expr(4)) {
        let ast = parse(&query).expect("generated query should parse");
        prop_assert!(ast.root.is_some());
        assert_well_formed(&ast);
    }

    #[test]
    fn render_then_parse_is_identity(query in arb_expr(4)) {
        let ast = parse(&query).expect("generated query should parse");
        let rendered = ast.to_query_string();
        let reparsed = parse(&rendered).expect("rendered query should reparse");
        prop_assert_eq!(ast, reparsed);
    }

    #[test]
    fn flat_and_chains_match_nested_form(leaves in prop::collection::vec(arb_leaf(), 2..40)) {
        let flat = parse(&format!("and||{}", leaves.join("||"))).unwrap();
        let nested = parse(&format!("{}{}", "and||".repeat(leaves.len() - 1), leaves.join("||"))).unwrap();

        let root = flat.root.as_ref().unwrap();
        prop_assert_eq!(root.arity(), leaves.len());
        prop_assert!(root.depth() <= 3);
        for (child, leaf) in root.children().zip(&leaves) {
            let parsed_leaf = parse(leaf).unwrap();
            prop_assert_eq!(Some(child), parsed_leaf.root.as_ref());
        }
        prop_assert_eq!(operands(&flat), operands(&nested));
    }

    #[test]
    fn walk_visits_every_node_once(query in arb_expr(3)) {
        let ast = parse(&query).unwrap();
        let root: &Node = ast.root.as_ref().unwrap();
        let counted = count(root);
        prop_assert_eq!(ast.walk().count(), counted);
    }
}

/// The non-boolean expressions of a tree, in order.
fn operands(ast: &Ast) -> Vec<&Node> {
    ast.walk()
        .filter(|n| n.operator_kind().is_some_and(|op| !op.is_logical()))
        .collect()
}

fn count(node: &Node) -> usize {
    1 + node.children().map(count).sum::<usize>()
}
