/// Serializer output rules: ordering, quoting, comments, layout
use crate::*;

fn reformat(source: &str) -> String {
    let catalog = test_catalog();
    let root = parse(source, &catalog).unwrap_or_else(|e| panic!("Failed to parse: {}", e));
    serialize(&root)
}

#[test]
fn test_type_written_first_then_own_then_subtype() {
    let source = "[Mesh]\n  dim = 2\n  type = GeneratedMesh\n  file = a.e\n[]\n";
    assert_eq!(
        reformat(source),
        "[Mesh]\n  type = GeneratedMesh\n  file = a.e\n  dim = 2\n[]\n"
    );
}

#[test]
fn test_defaults_are_not_written() {
    let source = "[Kernels]\n  [force]\n    type = BodyForce\n    variable = u\n  []\n[]\n";
    let output = reformat(source);
    assert!(!output.contains("value"));
    assert_eq!(output, source);
}

#[test]
fn test_arrays_and_function_expressions_are_quoted() {
    let source = "[BCs]\n  [left]\n    type = DirichletBC\n    variable = u\n    boundary = left right\n    value = 0\n  []\n[]\n\n[Functions]\n  [ff]\n    type = ParsedFunction\n    value = x*y\n  []\n[]\n";
    let output = reformat(source);
    assert!(output.contains("boundary = 'left right'"));
    assert!(output.contains("value = 'x*y'"));
    assert!(output.contains("    value = 0\n"));
}

#[test]
fn test_strings_quoted_only_when_needed() {
    let output = reformat("[Outputs]\n  file_base = 'out'\n[]\n");
    assert!(output.contains("file_base = out\n"));

    let output = reformat("[Outputs]\n  file_base = 'a=b'\n[]\n");
    assert!(output.contains("file_base = 'a=b'\n"));
}

#[test]
fn test_user_added_parameters_are_quoted() {
    let output = reformat("[Outputs]\n  extra = 3\n  empty =\n[]\n");
    assert!(output.contains("extra = '3'\n"));
    assert!(output.contains("empty = ''\n"));
}

#[test]
fn test_legacy_booleans_written_normalized() {
    assert_eq!(
        reformat("[Outputs]\n  exodus = 1\n[]\n"),
        "[Outputs]\n  exodus = true\n[]\n"
    );
}

#[test]
fn test_comment_placement() {
    let source = "[Outputs]  # results\n  # first\n  # second\n  exodus = true\n  csv = false  # off\n[]\n";
    assert_eq!(reformat(source), source);
}

#[test]
fn test_blank_line_only_between_top_level_blocks() {
    let source = "[Variables]\n  [u]\n  []\n  [v]\n  []\n[]\n\n[Outputs]\n[]\n";
    assert_eq!(reformat(source), source);
}

#[test]
fn test_custom_indent() {
    let catalog = test_catalog();
    let root = parse("[Variables]\n  [u]\n    order = SECOND\n  []\n[]\n", &catalog).unwrap();
    let output = Serializer::with_indent("    ").serialize(&root);
    assert_eq!(output, "[Variables]\n    [u]\n        order = SECOND\n    []\n[]\n");
}

#[test]
fn test_empty_tree_serializes_to_nothing() {
    assert_eq!(reformat(""), "");
    assert_eq!(reformat("# just a comment\n"), "");
}

#[test]
fn test_unknown_block_is_permissive() {
    let catalog = test_catalog();
    let root = parse("[Custom]\n  foo = bar baz\n  n = 3\n[]\n", &catalog).unwrap();
    let custom = root.find("/Custom").unwrap();
    assert!(!custom.is_schema_known());
    assert!(custom.all_parameters().all(|p| p.declared_type == ValueType::STRING));
    assert_eq!(
        serialize(&root),
        "[Custom]\n  foo = 'bar baz'\n  n = 3\n[]\n"
    );
}
