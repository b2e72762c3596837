use ocgen::{
    ast::{Ast, Node},
    attr::Attributes,
    parse,
    semantic::{self, Analysis, SemanticError},
};
use rstest::rstest;

fn load(text: &str) -> Ast {
    match parse::load(text.as_bytes(), 0, "test.oc") {
        Ok(ast) => ast,
        Err(diagnostics) => panic!("{}", diagnostics),
    }
}

fn analyze(ast: &Ast) -> Analysis {
    semantic::analyze(ast).expect("analysis aborted")
}

/// Cuerpo de la n-ésima definición de nivel superior.
fn body(ast: &Ast, definition: usize) -> &Node {
    ast.root().child(definition).unwrap().child(2).unwrap()
}

fn error_names(analysis: &Analysis) -> Vec<String> {
    analysis
        .errors()
        .iter()
        .map(|error| {
            let debug = format!("{:?}", error.val());
            debug.split('(').next().unwrap_or_default().to_owned()
        })
        .collect()
}

#[test]
fn duplicate_globals_keep_the_first_binding() {
    let ast = load("int a;\nint a;\n");
    let analysis = analyze(&ast);

    assert_eq!(analysis.errors().len(), 1);
    assert!(matches!(
        analysis.errors()[0].val(),
        SemanticError::DuplicateDeclaration(name) if name == "a"
    ));

    assert_eq!(analysis.errors()[0].location().start().line(), 2);

    let rejected = ast.root().child(1).unwrap().child(0).unwrap();
    assert!(analysis.symbol(rejected.declared_name().unwrap()).is_none());
    assert_eq!(analysis.report().to_string(), "a (0.1.5) {0} int variable lval\n");
}

#[test]
fn parameters_live_in_the_function_block() {
    let ast = load("int f(int x) { return x; }");
    let analysis = analyze(&ast);

    assert!(analysis.is_clean(), "{:?}", analysis.errors());
    assert_eq!(
        analysis.report().to_string(),
        "f (0.1.5) {0} int function\n   x (0.1.11) {1} int variable param lval 0\n"
    );

    let ret = body(&ast, 0).child(0).unwrap();
    let x = analysis.symbol(ret.child(0).unwrap()).unwrap();

    assert_eq!(x.name(), "x");
    assert_eq!(x.block(), 1);
    assert_eq!(x.sequence(), Some(0));
    assert_eq!(analysis.block(ret), Some(1));
}

#[test]
fn struct_tags_report_their_fields() {
    let ast = load(concat!(
        "struct node {\n",
        "   int value;\n",
        "   ptr<struct node> next;\n",
        "};\n",
    ));

    let analysis = analyze(&ast);
    assert!(analysis.is_clean(), "{:?}", analysis.errors());

    assert_eq!(
        analysis.report().to_string(),
        concat!(
            "node (0.1.8) {0} struct \"node\" typeid\n",
            "   value (0.2.8) {0} int field 0\n",
            "   next (0.3.21) {0} struct \"node\" field 1\n",
        )
    );
}

#[test]
fn locals_shadow_globals() {
    let ast = load("int x;\nvoid f() { string x; x = \"a\"; }");
    let analysis = analyze(&ast);
    assert!(analysis.is_clean(), "{:?}", analysis.errors());

    let assign = body(&ast, 1).child(1).unwrap();
    let x = analysis.symbol(assign.child(0).unwrap()).unwrap();

    assert_eq!(x.block(), 1);
    assert!(x.attributes().contains(Attributes::STRING | Attributes::LOCAL));
    assert_eq!(analysis.globals().len(), 2);
}

#[test]
fn blocks_increase_per_body() {
    let ast = load("void f(int a);\nvoid g() { }\nvoid h() { int b; }");
    let analysis = analyze(&ast);
    assert!(analysis.is_clean(), "{:?}", analysis.errors());

    let b = body(&ast, 2).child(0).unwrap().child(0).unwrap();
    let b = analysis.symbol(b.declared_name().unwrap()).unwrap();
    assert_eq!((b.name(), b.block(), b.sequence()), ("b", 3, Some(0)));
}

#[test]
fn field_accesses_resolve_through_pointers() {
    let ast = load(concat!(
        "struct node { int value; ptr<struct node> next; };\n",
        "void f(ptr<struct node> p) { p->next->value = 1; }\n",
    ));

    let analysis = analyze(&ast);
    assert!(analysis.is_clean(), "{:?}", analysis.errors());

    let assign = body(&ast, 1).child(0).unwrap();
    let target = assign.child(0).unwrap();

    assert_eq!(analysis.symbol(target).unwrap().name(), "value");
    assert_eq!(
        analysis.attributes(target),
        Attributes::INT | Attributes::VADDR | Attributes::LVAL
    );
}

#[test]
fn indexed_struct_pointers_lose_their_fields() {
    let ast = load(concat!(
        "struct s { int f; };\n",
        "array<ptr<struct s>> arr;\n",
        "void g(int i) { arr[i]->f = 1; }\n",
    ));

    let analysis = analyze(&ast);
    assert!(analysis.errors().iter().any(|error| matches!(
        error.val(),
        SemanticError::UndefinedField(field) if field == "f"
    )));

    let arrow = body(&ast, 2).child(0).unwrap().child(0).unwrap();
    let element = arrow.child(0).unwrap();

    assert_eq!(
        analysis.attributes(element),
        Attributes::VADDR | Attributes::LVAL
    );
    assert!(!analysis.attributes(element).contains(Attributes::STRUCT));
}

#[test]
fn prototypes_are_completed_by_definitions() {
    let ast = load("int f(int a);\nint f(int b) { return b; }\nvoid g() { f(1); }");
    let analysis = analyze(&ast);
    assert!(analysis.is_clean(), "{:?}", analysis.errors());

    let entries = analysis.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].symbol(), entries[1].symbol());
    assert!(analysis.symbols()[entries[0].symbol()].is_defined());
}

#[rstest]
#[case::void_return("void f() { return 5; }", "IncompatibleReturn")]
#[case::missing_return_value("int f() { return; }", "IncompatibleReturn")]
#[case::undefined_variable("void f() { y = 1; }", "UndefinedVariable")]
#[case::undefined_type("ptr<struct t> p;", "UndefinedType")]
#[case::undefined_field("struct n { int v; };\nvoid f(ptr<struct n> p) { p->w = 1; }", "UndefinedField")]
#[case::not_callable("int g;\nvoid f() { g(); }", "NotCallable")]
#[case::argument_count("int f(int a);\nvoid g() { f(); }", "IncompatibleArgument")]
#[case::argument_type("int f(int a);\nvoid g() { f(\"s\"); }", "IncompatibleArgument")]
#[case::arithmetic("void f() { string s; s = 1 + s; }", "IncompatibleBinop")]
#[case::negation("void f() { string s; s = -s; }", "IncompatibleUnop")]
#[case::comparison("void f() { if (\"a\" == 1) ; }", "IncompatibleCompare")]
#[case::index("int a;\nvoid f() { a[0] = 1; }", "IncompatibleIndex")]
#[case::assignment("void f() { int x; x = \"s\"; }", "IncompatibleAssignment")]
#[case::initializer("int x = \"s\";", "IncompatibleAssignment")]
#[case::prototype("int f(int a);\nint f(string a) { return 0; }", "IncompatiblePrototype")]
#[case::redefinition("void f() { }\nvoid f() { }", "DuplicateDeclaration")]
#[case::variable_as_function("int f;\nvoid f() { }", "DuplicateDeclaration")]
#[case::duplicate_parameter("void f(int a, int a) { }", "DuplicateDeclaration")]
fn errors_are_recovered(#[case] text: &str, #[case] expected: &str) {
    let analysis = analyze(&load(text));
    let errors = error_names(&analysis);

    assert!(errors.iter().any(|error| error == expected), "{:?}", errors);
}

#[test]
fn analysis_continues_after_errors() {
    let ast = load("void f() { y; z; }\nint g;");
    let analysis = analyze(&ast);

    assert_eq!(
        error_names(&analysis),
        vec!["UndefinedVariable", "UndefinedVariable"]
    );

    assert!(analysis.globals().get("g").is_some());
}
