use crate::algebra::Op;
use crate::binding::Binding;
use crate::context::ActiveGraph;
use crate::dispatch::{dispatch, dispatch_at};
use crate::error::QueryEvaluationError;
use crate::evaluator::Evaluator;
use crate::table::{Table, union_variables};
use oxrdf::{Term, Variable};
use spargebra::term::{GraphNamePattern, NamedNodePattern, TriplePattern};

/// Evaluates an algebra tree with the given evaluator.
///
/// ```
/// use oxrdf::{Dataset, GraphName, NamedNode, Quad};
/// use sparref::algebra::Op;
/// use sparref::{EvaluationOptions, ExecutionContext, SimpleEvaluator, eval};
/// use spargebra::Query;
///
/// let ex = NamedNode::new("http://example.com")?;
/// let mut dataset = Dataset::new();
/// dataset.insert(&Quad::new(ex.clone(), ex.clone(), ex.clone(), GraphName::DefaultGraph));
///
/// let Query::Select { pattern, .. } = Query::parse("SELECT * WHERE { ?s ?p ?o }", None)? else {
///     unreachable!()
/// };
/// let evaluator = SimpleEvaluator::new(ExecutionContext::new(&dataset, EvaluationOptions::default()));
/// let rows = eval(&evaluator, &Op::from(&pattern))?.into_bindings()?;
/// assert_eq!(rows.len(), 1);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub fn eval<'a, E: Evaluator<'a>>(evaluator: &E, op: &Op) -> Result<Table<'a>, QueryEvaluationError> {
    dispatch(evaluator, op)
}

/// Evaluates `inner` in the graph `name`.
///
/// If `name` is a variable `inner` is evaluated in every named graph and the graph name is bound to the variable.
/// A graph missing from the dataset yields no solution.
pub fn eval_graph<'a, E: Evaluator<'a>>(
    evaluator: &E,
    name: &NamedNodePattern,
    inner: &Op,
) -> Result<Table<'a>, QueryEvaluationError> {
    graph_at(evaluator, name, inner, 0)
}

/// Matches a basic graph pattern in the graph `graph_name`.
///
/// An empty pattern matches once, whatever the graph.
pub fn eval_quad_pattern<'a, E: Evaluator<'a>>(
    evaluator: &E,
    graph_name: &GraphNamePattern,
    patterns: &[TriplePattern],
) -> Result<Table<'a>, QueryEvaluationError> {
    quad_pattern_at(evaluator, graph_name, patterns)
}

/// Binds the named graphs of the dataset to a variable, or checks that a named graph exists
pub fn eval_dataset_names<'a, E: Evaluator<'a>>(
    evaluator: &E,
    graph_name: &NamedNodePattern,
) -> Result<Table<'a>, QueryEvaluationError> {
    dataset_names_at(evaluator, graph_name)
}

pub(crate) fn graph_at<'a, E: Evaluator<'a>>(
    evaluator: &E,
    name: &NamedNodePattern,
    inner: &Op,
    depth: usize,
) -> Result<Table<'a>, QueryEvaluationError> {
    match name {
        NamedNodePattern::NamedNode(name) => {
            let name = Term::from(name.clone());
            match in_graph(evaluator, name)? {
                Some(evaluator) => dispatch_at(&evaluator, inner, depth),
                None => Ok(Table::empty()),
            }
        }
        NamedNodePattern::Variable(variable) => for_each_named_graph(evaluator, variable, |e| {
            dispatch_at(e, inner, depth)
        }),
    }
}

pub(crate) fn quad_pattern_at<'a, E: Evaluator<'a>>(
    evaluator: &E,
    graph_name: &GraphNamePattern,
    patterns: &[TriplePattern],
) -> Result<Table<'a>, QueryEvaluationError> {
    if patterns.is_empty() {
        return Ok(evaluator.unit());
    }
    match graph_name {
        GraphNamePattern::DefaultGraph => {
            let context = evaluator.context();
            let active_graph = if context.options().is_union_default_graph() {
                ActiveGraph::Union
            } else {
                ActiveGraph::DefaultGraph
            };
            evaluator
                .with_context(context.with_active_graph(active_graph))
                .basic_pattern(patterns)
        }
        GraphNamePattern::NamedNode(name) => match in_graph(evaluator, name.clone().into())? {
            Some(evaluator) => evaluator.basic_pattern(patterns),
            None => Ok(Table::empty()),
        },
        GraphNamePattern::Variable(variable) => {
            for_each_named_graph(evaluator, variable, |e| e.basic_pattern(patterns))
        }
    }
}

pub(crate) fn dataset_names_at<'a, E: Evaluator<'a>>(
    evaluator: &E,
    graph_name: &NamedNodePattern,
) -> Result<Table<'a>, QueryEvaluationError> {
    let context = evaluator.context();
    match graph_name {
        NamedNodePattern::NamedNode(name) => Ok(if context.contains_graph(&name.clone().into())? {
            evaluator.unit()
        } else {
            Table::empty()
        }),
        NamedNodePattern::Variable(variable) => Ok(Table::from_bindings(
            vec![variable.clone()],
            context
                .named_graphs()?
                .into_iter()
                .map(|g| Binding::singleton(variable.clone(), g))
                .collect(),
        )),
    }
}

/// The evaluator with `graph_name` active, `None` if the graph does not exist
fn in_graph<'a, E: Evaluator<'a>>(
    evaluator: &E,
    graph_name: Term,
) -> Result<Option<E>, QueryEvaluationError> {
    let context = evaluator.context();
    if !context.contains_graph(&graph_name)? {
        return Ok(None);
    }
    Ok(Some(evaluator.with_context(
        context.with_active_graph(ActiveGraph::NamedGraph(graph_name)),
    )))
}

/// Runs `evaluate` in every named graph, joins each result with the graph name bound to `variable`
/// and concatenates them.
///
/// Each graph result is fully read before the next graph is opened.
fn for_each_named_graph<'a, E: Evaluator<'a>>(
    evaluator: &E,
    variable: &Variable,
    mut evaluate: impl FnMut(&E) -> Result<Table<'a>, QueryEvaluationError>,
) -> Result<Table<'a>, QueryEvaluationError> {
    let context = evaluator.context();
    let mut variables = vec![variable.clone()];
    let mut rows = Vec::new();
    for graph_name in context.named_graphs()? {
        let graph_evaluator = evaluator.with_context(
            context.with_active_graph(ActiveGraph::NamedGraph(graph_name.clone())),
        );
        let table = evaluate(&graph_evaluator)?;
        let table = graph_evaluator.join(table, Table::singleton(variable.clone(), graph_name))?;
        variables = union_variables(&variables, table.variables());
        rows.extend(table.into_bindings()?);
    }
    Ok(Table::from_bindings(variables, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::options::EvaluationOptions;
    use crate::simple::SimpleEvaluator;
    use oxrdf::{Dataset, GraphName, Literal, NamedNode, Quad};
    use spargebra::term::TermPattern;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn spo() -> Vec<TriplePattern> {
        vec![TriplePattern {
            subject: Variable::new_unchecked("s").into(),
            predicate: Variable::new_unchecked("p").into(),
            object: Variable::new_unchecked("o").into(),
        }]
    }

    fn two_graphs() -> Dataset {
        let mut dataset = Dataset::new();
        dataset.insert(&Quad::new(ex("a"), ex("p"), Literal::from(1), ex("g1")));
        dataset.insert(&Quad::new(ex("b"), ex("p"), Literal::from(2), ex("g2")));
        dataset.insert(&Quad::new(
            ex("c"),
            ex("p"),
            Literal::from(3),
            GraphName::DefaultGraph,
        ));
        dataset
    }

    #[test]
    fn variable_graph_binds_each_named_graph() {
        let dataset = two_graphs();
        let evaluator = SimpleEvaluator::new(ExecutionContext::new(
            &dataset,
            EvaluationOptions::default(),
        ));
        let g = Variable::new_unchecked("g");
        let rows = eval_graph(&evaluator, &g.clone().into(), &Op::Bgp { patterns: spo() })
            .unwrap()
            .into_bindings()
            .unwrap();
        assert_eq!(rows.len(), 2);
        let mut graphs = rows.iter().map(|r| r.get(&g).cloned()).collect::<Vec<_>>();
        graphs.sort_by_key(|t| t.as_ref().map(ToString::to_string));
        assert_eq!(graphs, vec![Some(ex("g1").into()), Some(ex("g2").into())]);
    }

    #[test]
    fn empty_dataset_has_no_graph() {
        let dataset = Dataset::new();
        let evaluator = SimpleEvaluator::new(ExecutionContext::new(
            &dataset,
            EvaluationOptions::default(),
        ));
        let g = NamedNodePattern::from(Variable::new_unchecked("g"));
        assert!(eval_graph(&evaluator, &g, &Op::unit()).unwrap().is_empty());
        assert!(
            eval_quad_pattern(&evaluator, &Variable::new_unchecked("g").into(), &spo())
                .unwrap()
                .is_empty()
        );
        assert!(eval_dataset_names(&evaluator, &g).unwrap().is_empty());
    }

    #[test]
    fn empty_quad_pattern_is_unit() {
        let dataset = Dataset::new();
        let evaluator = SimpleEvaluator::new(ExecutionContext::new(
            &dataset,
            EvaluationOptions::default(),
        ));
        let rows = eval_quad_pattern(&evaluator, &ex("missing").into(), &[])
            .unwrap()
            .into_bindings()
            .unwrap();
        assert_eq!(rows, vec![Binding::new()]);
    }

    #[test]
    fn missing_named_graph_is_empty() {
        let dataset = two_graphs();
        let evaluator = SimpleEvaluator::new(ExecutionContext::new(
            &dataset,
            EvaluationOptions::default(),
        ));
        assert!(
            eval_graph(&evaluator, &ex("g3").into(), &Op::unit())
                .unwrap()
                .is_empty()
        );
        assert!(
            eval_dataset_names(&evaluator, &ex("g3").into())
                .unwrap()
                .is_empty()
        );
        assert!(
            !eval_dataset_names(&evaluator, &ex("g1").into())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn default_graph_quad_pattern() {
        let dataset = two_graphs();
        let evaluator = SimpleEvaluator::new(ExecutionContext::new(
            &dataset,
            EvaluationOptions::default(),
        ));
        let rows = eval_quad_pattern(&evaluator, &GraphNamePattern::DefaultGraph, &spo())
            .unwrap()
            .into_bindings()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get(&Variable::new_unchecked("o")),
            Some(&Literal::from(3).into())
        );

        let union = SimpleEvaluator::new(ExecutionContext::new(
            &dataset,
            EvaluationOptions::default().with_union_default_graph(),
        ));
        let pattern = [TriplePattern {
            subject: TermPattern::Variable(Variable::new_unchecked("s")),
            predicate: ex("p").into(),
            object: Variable::new_unchecked("o").into(),
        }];
        assert_eq!(
            eval_quad_pattern(&union, &GraphNamePattern::DefaultGraph, &pattern)
                .unwrap()
                .into_bindings()
                .unwrap()
                .len(),
            2
        );
    }
}
