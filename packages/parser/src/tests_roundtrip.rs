/// Text -> tree -> text round-trips and recoverable load problems
use crate::*;

const CANONICAL: &str = r#"[Mesh]
  type = GeneratedMesh
  dim = 2
  nx = 10
  ny = 10
[]

[Variables]
  [u]
    order = SECOND
  []
[]

[Kernels]
  [diff]
    type = Diffusion
    variable = u
  []
  [force]
    type = BodyForce
    variable = u
    function = ff  # forcing
  []
[]

[BCs]
  [left]
    type = DirichletBC
    variable = u
    boundary = 'left right'
    value = 0
  []
[]

[Functions]
  [ff]
    type = ParsedFunction
    value = 'sin(x)*y'
  []
[]

[Executioner]
  type = Transient
  petsc_options_iname = '-pc_type'
  solve_type = NEWTON
  num_steps = 5
  dt = 0.5
[]

[Outputs]
  exodus = true
[]
"#;

#[test]
fn test_canonical_document_roundtrips_exactly() {
    let catalog = test_catalog();
    let root = parse(CANONICAL, &catalog).unwrap();
    assert_eq!(serialize(&root), CANONICAL);
}

#[test]
fn test_reparse_is_structurally_equal() {
    let catalog = test_catalog();
    let root = parse(CANONICAL, &catalog).unwrap();
    let reparsed = parse(&serialize(&root), &catalog).unwrap();
    assert!(root.structurally_eq(&reparsed));
    assert_eq!(root.paths(), reparsed.paths());
}

#[test]
fn test_loaded_tree_shape() {
    let catalog = test_catalog();
    let root = parse(CANONICAL, &catalog).unwrap();

    let mesh = root.find("/Mesh").unwrap();
    assert_eq!(mesh.active_subtype(), Some("GeneratedMesh"));
    assert_eq!(mesh.parameter("nx").unwrap().value(), Some(&ParamValue::from(10i64)));
    assert!(!mesh.user_added);

    let u = root.find("/Variables/u").unwrap();
    assert!(u.user_added);
    assert!(u.unused_child("InitialCondition").is_some());
    assert!(root.find("/Variables/u/InitialCondition").is_none());

    let left = root.find("/BCs/left").unwrap();
    assert_eq!(
        left.parameter("boundary").unwrap().value(),
        Some(&ParamValue::from(vec!["left", "right"]))
    );

    // schema blocks missing from the text stay available as unused entries
    assert!(root.unused_child("Mesh").is_none());
    assert!(root.diagnostics().is_empty());
}

#[test]
fn test_noncanonical_input_is_normalized_and_idempotent() {
    let source = "[Mesh]\ntype=GeneratedMesh\n   dim = 2   # two\n[]\n[Kernels]\n  [./diff]\n    variable = u\n    type = Diffusion\n  [../]\n[]\n";
    let catalog = test_catalog();
    let once = serialize(&parse(source, &catalog).unwrap());
    assert_eq!(
        once,
        "[Mesh]\n  type = GeneratedMesh\n  dim = 2  # two\n[]\n\n[Kernels]\n  [diff]\n    type = Diffusion\n    variable = u\n  []\n[]\n"
    );
    let twice = serialize(&parse(&once, &catalog).unwrap());
    assert_eq!(once, twice);
}

#[test]
fn test_unknown_type_keeps_text_and_warns() {
    let source = "[Kernels]\n  [k]\n    type = Nope\n    variable = u\n  []\n[]\n";
    let catalog = test_catalog();
    let root = parse(source, &catalog).unwrap();

    let k = root.find("/Kernels/k").unwrap();
    assert_eq!(k.active_subtype(), None);
    assert_eq!(
        root.diagnostics(),
        vec![&ParseError::unknown_type("/Kernels/k", "Nope")]
    );
    assert_eq!(serialize(&root), source);
}

#[test]
fn test_invalid_value_relaxes_slot() {
    let source = "[Mesh]\n  type = GeneratedMesh\n  nx = ten\n[]\n";
    let catalog = test_catalog();
    let root = parse(source, &catalog).unwrap();

    let nx = root.find("/Mesh").unwrap().parameter("nx").unwrap();
    assert_eq!(nx.declared_type, ValueType::STRING);
    assert_eq!(nx.value(), Some(&ParamValue::from("ten")));
    assert!(matches!(
        root.diagnostics()[0],
        ParseError::InvalidValue { parameter, .. } if parameter == "nx"
    ));
    assert_eq!(serialize(&root), source);
}

#[test]
fn test_malformed_input_is_rejected() {
    let catalog = test_catalog();
    for source in ["[Mesh]\n", "[]\n", "[Mesh]\n  = 3\n[]\n", "[Mesh]\n  dim = 'x\n[]\n"] {
        let err = parse(source, &catalog).unwrap_err();
        assert!(err.is_fatal(), "expected fatal error for {:?}", source);
    }
}
