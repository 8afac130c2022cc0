//! Properties of the algebra operators, evaluated with the reference evaluator

use oxrdf::{Dataset, GraphName, Literal, NamedNode, Quad, Variable};
use sparref::algebra::{Expression, Op};
use sparref::{Binding, EvaluationOptions, ExecutionContext, SimpleEvaluator, eval};
use spargebra::Query;
use spargebra::algebra::Function;

fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

fn ex(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{name}"))
}

fn row(values: &[(&str, i64)]) -> Binding {
    values
        .iter()
        .map(|(name, value)| (var(name), Literal::from(*value).into()))
        .collect()
}

fn values(variables: &[&str], rows: Vec<Binding>) -> Op {
    Op::Table {
        variables: variables.iter().map(|v| var(v)).collect(),
        rows,
    }
}

fn run_on(dataset: &Dataset, op: &Op) -> Vec<Binding> {
    let evaluator = SimpleEvaluator::new(ExecutionContext::new(
        dataset,
        EvaluationOptions::default(),
    ));
    eval(&evaluator, op).unwrap().into_bindings().unwrap()
}

fn run(op: &Op) -> Vec<Binding> {
    run_on(&Dataset::new(), op)
}

fn sorted(mut rows: Vec<Binding>) -> Vec<Binding> {
    rows.sort_by_key(ToString::to_string);
    rows
}

fn sample() -> Op {
    values(
        &["x", "y"],
        vec![
            row(&[("x", 1), ("y", 1)]),
            row(&[("x", 2)]),
            row(&[("x", 2)]),
            Binding::new(),
        ],
    )
}

fn pattern(query: &str) -> Op {
    let Query::Select { pattern, .. } = Query::parse(query, None).unwrap() else {
        unreachable!()
    };
    Op::from(&pattern)
}

#[test]
fn join_with_unit_is_identity() {
    let expected = sorted(run(&sample()));
    assert_eq!(sorted(run(&Op::join(Op::unit(), sample()))), expected);
    assert_eq!(sorted(run(&Op::join(sample(), Op::unit()))), expected);
}

#[test]
fn join_with_empty_is_empty() {
    assert!(run(&Op::join(sample(), Op::Null)).is_empty());
    assert!(run(&Op::join(Op::Null, sample())).is_empty());
}

#[test]
fn union_is_bag_sum() {
    let left = values(&["x"], vec![row(&[("x", 1)]), row(&[("x", 1)])]);
    let right = values(&["x"], vec![row(&[("x", 1)]), row(&[("x", 2)])]);
    let rows = run(&Op::union(left, right));
    assert_eq!(rows.len(), 4);
    assert_eq!(rows.iter().filter(|r| **r == row(&[("x", 1)])).count(), 3);
}

#[test]
fn left_join_keeps_every_left_solution() {
    let left = values(&["x"], vec![row(&[("x", 1)]), row(&[("x", 2)]), row(&[("x", 3)])]);
    let right = values(
        &["x", "y"],
        vec![row(&[("x", 1), ("y", 10)]), row(&[("x", 1), ("y", 11)])],
    );
    let rows = run(&Op::left_join(left, right, Vec::new()));
    assert_eq!(rows.len(), 4);
    for x in 1..=3 {
        assert!(rows.iter().any(|r| r.project(&[var("x")]) == row(&[("x", x)])));
    }
    assert!(rows.contains(&row(&[("x", 2)])));
    assert!(rows.contains(&row(&[("x", 3)])));
}

#[test]
fn left_join_condition_failure_keeps_left() {
    let left = values(&["x"], vec![row(&[("x", 1)])]);
    let right = values(&["y"], vec![row(&[("y", 5)])]);
    let condition = Expression::Greater(
        Box::new(Expression::Variable(var("y"))),
        Box::new(Expression::Literal(Literal::from(10))),
    );
    let rows = run(&Op::left_join(left, right, vec![condition]));
    assert_eq!(rows, vec![row(&[("x", 1)])]);
}

#[test]
fn minus_removes_compatible_solutions_sharing_a_variable() {
    let left = values(&["x", "y"], vec![row(&[("x", 1), ("y", 2)]), row(&[("x", 3)])]);
    let right = values(&["x"], vec![row(&[("x", 1)])]);
    assert_eq!(run(&Op::minus(left, right)), vec![row(&[("x", 3)])]);
}

#[test]
fn minus_keeps_solutions_incompatible_with_the_right() {
    let left = values(&["x", "y"], vec![row(&[("x", 1), ("y", 2)])]);
    let right = values(&["x", "y"], vec![row(&[("x", 1), ("y", 9)])]);
    assert_eq!(
        run(&Op::minus(left, right)),
        vec![row(&[("x", 1), ("y", 2)])]
    );
}

#[test]
fn minus_keeps_solutions_disjoint_from_the_right() {
    let left = values(&["x"], vec![row(&[("x", 1)])]);
    let right = values(&["z"], vec![row(&[("z", 1)])]);
    assert_eq!(run(&Op::minus(left, right)), vec![row(&[("x", 1)])]);
}

#[test]
fn diff_and_minus_disagree_on_disjoint_and_partial_rows() {
    let left = || {
        values(
            &["x", "y"],
            vec![Binding::new(), row(&[("x", 1), ("y", 5)])],
        )
    };
    let right = || values(&["x"], vec![row(&[("x", 1)])]);
    // The empty solution is contained in every solution but shares no variable
    assert_eq!(
        run(&Op::diff(left(), right())),
        vec![row(&[("x", 1), ("y", 5)])]
    );
    assert_eq!(run(&Op::minus(left(), right())), vec![Binding::new()]);
}

#[test]
fn slice_bounds() {
    let ten = values(&["x"], (0..10).map(|i| row(&[("x", i)])).collect());
    assert_eq!(run(&Op::slice(ten.clone(), 0, None)).len(), 10);
    assert_eq!(run(&Op::slice(ten.clone(), 3, Some(4))).len(), 4);
    assert_eq!(run(&Op::slice(ten.clone(), 8, Some(4))).len(), 2);
    assert_eq!(run(&Op::slice(ten.clone(), 12, None)).len(), 0);
    assert_eq!(run(&Op::slice(ten.clone(), 0, Some(0))).len(), 0);
    assert_eq!(
        run(&Op::slice(ten, 3, Some(2))),
        vec![row(&[("x", 3)]), row(&[("x", 4)])]
    );
}

#[test]
fn distinct_is_idempotent() {
    let once = run(&Op::Distinct {
        inner: Box::new(sample()),
    });
    assert_eq!(once.len(), 3);
    let twice = run(&Op::Distinct {
        inner: Box::new(Op::Distinct {
            inner: Box::new(sample()),
        }),
    });
    assert_eq!(once, twice);
}

#[test]
fn reduced_is_between_distinct_and_input() {
    let input = run(&sample());
    let distinct = run(&Op::Distinct {
        inner: Box::new(sample()),
    });
    let reduced = run(&Op::Reduced {
        inner: Box::new(sample()),
    });
    assert!(distinct.len() <= reduced.len());
    assert!(reduced.len() <= input.len());
    for r in &reduced {
        assert!(input.contains(r));
    }
    for d in &distinct {
        assert!(reduced.contains(d));
    }
}

#[test]
fn filter_errors_remove_the_solution() {
    let input = values(
        &["x"],
        vec![
            row(&[("x", 1)]),
            Binding::singleton(var("x"), Literal::new_simple_literal("a").into()),
            Binding::new(),
            row(&[("x", 5)]),
        ],
    );
    // ?x < 3 fails on strings and on the unbound variable
    let less = Expression::Less(
        Box::new(Expression::Variable(var("x"))),
        Box::new(Expression::Literal(Literal::from(3))),
    );
    assert_eq!(run(&Op::filter(vec![less.clone()], input.clone())), vec![row(&[("x", 1)])]);
    // NOT of an error is still an error
    let not_less = Expression::Not(Box::new(less));
    assert_eq!(run(&Op::filter(vec![not_less], input)), vec![row(&[("x", 5)])]);
}

#[test]
fn filter_with_error_in_or_operand() {
    let input = values(&["x"], vec![Binding::new(), row(&[("x", 1)])]);
    let or = Expression::Or(
        Box::new(Expression::FunctionCall(
            Function::Str,
            vec![Expression::Variable(var("x"))],
        )),
        Box::new(Expression::Literal(Literal::from(true))),
    );
    assert_eq!(run(&Op::filter(vec![or], input)).len(), 2);
}

#[test]
fn variable_graph_over_empty_dataset() {
    assert!(run(&pattern("SELECT * WHERE { GRAPH ?g { ?s ?p ?o } }")).is_empty());
    assert!(run(&pattern("SELECT * WHERE { GRAPH ?g {} }")).is_empty());
}

#[test]
fn empty_quad_pattern_is_unit() {
    let op = Op::QuadPattern {
        graph_name: ex("g").into(),
        patterns: Vec::new(),
    };
    assert_eq!(run(&op), vec![Binding::new()]);
}

#[test]
fn variable_graph_over_two_named_graphs() {
    let mut dataset = Dataset::new();
    dataset.insert(&Quad::new(ex("s1"), ex("p"), ex("o1"), ex("g1")));
    dataset.insert(&Quad::new(ex("s2"), ex("p"), ex("o2"), ex("g2")));
    dataset.insert(&Quad::new(
        ex("s3"),
        ex("p"),
        ex("o3"),
        GraphName::DefaultGraph,
    ));
    let rows = sorted(run_on(
        &dataset,
        &pattern("SELECT * WHERE { GRAPH ?g { ?s ?p ?o } }"),
    ));
    let expected = sorted(vec![
        [
            (var("g"), ex("g1").into()),
            (var("s"), ex("s1").into()),
            (var("p"), ex("p").into()),
            (var("o"), ex("o1").into()),
        ]
        .into_iter()
        .collect(),
        [
            (var("g"), ex("g2").into()),
            (var("s"), ex("s2").into()),
            (var("p"), ex("p").into()),
            (var("o"), ex("o2").into()),
        ]
        .into_iter()
        .collect(),
    ]);
    assert_eq!(rows, expected);
}

#[test]
fn graph_variable_already_bound_by_the_body() {
    let mut dataset = Dataset::new();
    dataset.insert(&Quad::new(ex("g1"), ex("p"), ex("o"), ex("g1")));
    dataset.insert(&Quad::new(ex("g1"), ex("p"), ex("o"), ex("g2")));
    let rows = run_on(
        &dataset,
        &pattern("SELECT * WHERE { GRAPH ?g { ?g ?p ?o } }"),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(&var("g")), Some(&ex("g1").into()));
}

#[test]
fn path_sequence_joins_on_its_intermediate_node() {
    let mut dataset = Dataset::new();
    dataset.insert(&Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph));
    dataset.insert(&Quad::new(ex("b"), ex("q"), ex("c"), GraphName::DefaultGraph));
    dataset.insert(&Quad::new(ex("x"), ex("p"), ex("y"), GraphName::DefaultGraph));
    let expected = vec![
        [(var("s"), ex("a").into()), (var("o"), ex("c").into())]
            .into_iter()
            .collect::<Binding>(),
    ];
    for query in [
        "SELECT ?s ?o WHERE { ?s <http://example.com/p>+/<http://example.com/q> ?o }",
        "SELECT ?s ?o WHERE { ?s <http://example.com/p> [ <http://example.com/q> ?o ] }",
    ] {
        assert_eq!(run_on(&dataset, &pattern(query)), expected, "{query}");
    }
}
