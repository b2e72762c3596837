use ocgen::{
    ast::{Ast, Node, Tag},
    generate, parse,
    source::{Location, Source},
};
use rstest::rstest;

fn lower(text: &str) -> String {
    let ast = match parse::load(text.as_bytes(), 0, "test.oc") {
        Ok(ast) => ast,
        Err(diagnostics) => panic!("{}", diagnostics),
    };

    generate(&ast).expect("bad tree shape").to_string()
}

/// Listado esperado a partir de pares (etiqueta, instrucción).
fn listing(lines: &[(&str, &str)]) -> String {
    lines
        .iter()
        .map(|&(label, instruction)| match instruction {
            "" => format!("{}\n", label),
            _ => format!("{:<10}{}\n", label, instruction),
        })
        .collect()
}

#[test]
fn binary_operations_go_through_temporaries() {
    let text = "void f() { int a; int b; int c; a = b + c; }";

    assert_eq!(
        lower(text),
        listing(&[
            ("f:", ".function"),
            ("", ".local int a"),
            ("", ".local int b"),
            ("", ".local int c"),
            ("", "$t0 = b + c"),
            ("", "a = $t0"),
            ("", "return"),
            ("", ".end"),
        ])
    );
}

#[test]
fn equality_guards_are_inverted() {
    let text = "void f(int a, int b) { if (a == b) a = 1; }";

    assert_eq!(
        lower(text),
        listing(&[
            ("f:", ".function"),
            ("", ".param int a"),
            ("", ".param int b"),
            (".if0:", "goto .fi0 if a != b"),
            (".th0:", "a = 1"),
            (".fi0:", "return"),
            ("", ".end"),
        ])
    );
}

#[test]
fn loops_jump_back_to_their_condition() {
    let text = "void f(int n) { while (n > 0) n = n - 1; }";

    assert_eq!(
        lower(text),
        listing(&[
            ("f:", ".function"),
            ("", ".param int n"),
            (".wh0:", "$t0 = n > 0"),
            ("", "goto .od0 if not $t0"),
            (".do0:", "$t1 = n - 1"),
            ("", "n = $t1"),
            ("", "goto .wh0"),
            (".od0:", "return"),
            ("", ".end"),
        ])
    );
}

#[test]
fn sibling_branches_get_their_own_labels() {
    let text = "void f(int a) { if (!a) a = 1; else a = 2; if (a != 0) a = 3; }";

    assert_eq!(
        lower(text),
        listing(&[
            ("f:", ".function"),
            ("", ".param int a"),
            (".if0:", "goto .el0 if a"),
            (".th0:", "a = 1"),
            ("", "goto .fi0"),
            (".el0:", "a = 2"),
            (".fi0:", ""),
            (".if1:", "goto .fi1 if a == 0"),
            (".th1:", "a = 3"),
            (".fi1:", "return"),
            ("", ".end"),
        ])
    );
}

#[test]
fn file_scope_declarations() {
    let text = concat!(
        "struct node { int value; ptr<struct node> next; };\n",
        "int count = 3;\n",
        "string name = \"oc\";\n",
        "ptr<struct node> head;\n",
        "array<int> table;\n",
    );

    assert_eq!(
        lower(text),
        listing(&[
            ("", ".struct node"),
            ("", ".field int value"),
            ("", ".field ptr<struct node> next"),
            ("", ".end"),
            ("count:", ".global int 3"),
            (".s0:", "\"oc\""),
            ("name:", ".global string .s0"),
            ("", ".global ptr<struct node> head"),
            ("", "head = malloc node"),
            ("", ".global array<int> table"),
        ])
    );
}

#[test]
fn values_calls_and_allocations() {
    let text = concat!(
        "void f(array<int> v, int i) { i = v[i + 1]; g(i, 2); v = alloc<array<int>>(i); }\n",
        "int h() { return 1 + 2; }\n",
        "int g(int x, int y);\n",
    );

    assert_eq!(
        lower(text),
        listing(&[
            ("f:", ".function"),
            ("", ".param array<int> v"),
            ("", ".param int i"),
            ("", "$t0 = i + 1"),
            ("", "$t1 = v[$t0]"),
            ("", "i = $t1"),
            ("", "call g (i, 2)"),
            ("", "$t2 = malloc array<int> i"),
            ("", "v = $t2"),
            ("", "return"),
            ("", ".end"),
            ("h:", ".function int"),
            ("", "$t3 = 1 + 2"),
            ("", "return $t3"),
            ("", "return"),
            ("", ".end"),
        ])
    );
}

#[test]
fn pointer_locals_absorb_their_allocation() {
    let text = "void f() { ptr<struct node> p = alloc<struct node>(); p->value = 0; }";

    assert_eq!(
        lower(text),
        listing(&[
            ("f:", ".function"),
            ("", ".local ptr<struct node> p"),
            ("", "p = malloc node"),
            ("", "p->value = 0"),
            ("", "return"),
            ("", ".end"),
        ])
    );
}

#[rstest]
#[case("void f(int a) { a = a * 2 + 1; }", "$t1 = $t0 + 1")]
#[case("void f(int a) { a = -a; }", "$t0 = - a")]
#[case("void f(int a) { if (a < 1) a = 0; }", "goto .fi0 if not $t0")]
#[case("void f(int a) { while (a) a = 0; }", "goto .od0 if not $t0")]
#[case("void f(string s) { s = \"x\"; }", "s = \"x\"")]
#[case("void f(int a) { a = g(a); }", "$t0 = call g (a)")]
fn lowered_lines(#[case] text: &str, #[case] line: &str) {
    let output = lower(text);
    assert!(
        output.lines().any(|found| found.trim_start() == line),
        "{}",
        output
    );
}

#[test]
fn generation_is_deterministic() {
    let text = concat!(
        "void f(int a) {\n",
        "   while (a > 0) { if (a == 3) a = 0; else a = a - 1; }\n",
        "   if (a != 1) { while (!a) a = 1; }\n",
        "}\n",
    );

    let first = lower(text);
    assert_eq!(first, lower(text));

    for label in [".wh0:", ".wh1:", ".if0:", ".if1:", ".el0:", ".od1:"] {
        assert_eq!(first.matches(label).count(), 1, "{}", label);
    }
}

#[test]
fn misplaced_nodes_are_shape_errors() {
    let source = Source::new(0, "test");
    let at = Location::point(&source, 1, 1);

    let root = Node::new(Tag::Root, at.clone(), "").adopt(Node::new(Tag::Params, at, "("));
    assert!(generate(&Ast::new(root)).is_err());
}
