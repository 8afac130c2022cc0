//! [Property paths](https://www.w3.org/TR/sparql11-query/#propertypaths).
//!
//! The closure operators (`*`, `+`, `?`) have set semantics: each reachable node is returned once.

use crate::bgp::{bind, hide_blank_node};
use crate::binding::Binding;
use crate::context::ExecutionContext;
use crate::error::QueryEvaluationError;
use crate::table::Table;
use oxrdf::{NamedNode, Term, Variable};
use rustc_hash::FxHashSet;
use spargebra::algebra::PropertyPathExpression;
use spargebra::term::TermPattern;

/// Matches `subject path object` against the active graph.
///
/// Blank nodes at the ends of the path are bound to their hidden variables. The result is materialized.
pub(crate) fn evaluate_path<'a>(
    subject: &TermPattern,
    path: &PropertyPathExpression,
    object: &TermPattern,
    context: &ExecutionContext<'a>,
) -> Result<Table<'a>, QueryEvaluationError> {
    let subject = hide_blank_node(subject);
    let object = hide_blank_node(object);
    let subject_variable = variable(&subject);
    let object_variable = variable(&object);
    let mut rows = Vec::new();
    match (constant(&subject), constant(&object)) {
        (Some(start), Some(end)) => {
            if step(path, &start, true, context)?.contains(&end) {
                rows.push(Binding::new());
            }
        }
        (Some(start), None) => {
            for end in step(path, &start, true, context)? {
                rows.extend(bind(Binding::new(), object_variable, end));
            }
        }
        (None, Some(end)) => {
            for start in step(path, &end, false, context)? {
                rows.extend(bind(Binding::new(), subject_variable, start));
            }
        }
        (None, None) => {
            for start in context.graph_nodes()? {
                for end in step(path, &start, true, context)? {
                    rows.extend(
                        bind(Binding::new(), subject_variable, start.clone())
                            .and_then(|row| bind(row, object_variable, end)),
                    );
                }
            }
        }
    }
    let variables = subject_variable
        .into_iter()
        .chain(object_variable.filter(|v| Some(*v) != subject_variable))
        .cloned()
        .collect();
    Ok(Table::from_bindings(variables, rows))
}

fn variable(pattern: &TermPattern) -> Option<&Variable> {
    match pattern {
        TermPattern::Variable(v) => Some(v),
        _ => None,
    }
}

fn constant(pattern: &TermPattern) -> Option<Term> {
    match pattern {
        TermPattern::NamedNode(t) => Some(t.clone().into()),
        TermPattern::BlankNode(t) => Some(t.clone().into()),
        TermPattern::Literal(t) => Some(t.clone().into()),
        TermPattern::Variable(_) => None,
    }
}

/// Nodes reachable from `node` following `path`, or against it if `forward` is false
fn step(
    path: &PropertyPathExpression,
    node: &Term,
    forward: bool,
    context: &ExecutionContext<'_>,
) -> Result<Vec<Term>, QueryEvaluationError> {
    Ok(match path {
        PropertyPathExpression::NamedNode(p) => {
            let p = Term::from(p.clone());
            if forward {
                context
                    .triples_for_pattern(Some(node), Some(&p), None)?
                    .into_iter()
                    .map(|(_, _, o)| o)
                    .collect()
            } else {
                context
                    .triples_for_pattern(None, Some(&p), Some(node))?
                    .into_iter()
                    .map(|(s, _, _)| s)
                    .collect()
            }
        }
        PropertyPathExpression::Reverse(p) => step(p, node, !forward, context)?,
        PropertyPathExpression::Sequence(a, b) => {
            let (first, second) = if forward { (a, b) } else { (b, a) };
            let mut output = Vec::new();
            for middle in step(first, node, forward, context)? {
                output.extend(step(second, &middle, forward, context)?);
            }
            output
        }
        PropertyPathExpression::Alternative(a, b) => {
            let mut output = step(a, node, forward, context)?;
            output.extend(step(b, node, forward, context)?);
            output
        }
        PropertyPathExpression::ZeroOrMore(p) => closure(p, vec![node.clone()], forward, context)?,
        PropertyPathExpression::OneOrMore(p) => {
            closure(p, step(p, node, forward, context)?, forward, context)?
        }
        PropertyPathExpression::ZeroOrOne(p) => {
            let mut output = vec![node.clone()];
            for next in step(p, node, forward, context)? {
                if !output.contains(&next) {
                    output.push(next);
                }
            }
            output
        }
        PropertyPathExpression::NegatedPropertySet(excluded) => {
            let triples = if forward {
                context.triples_for_pattern(Some(node), None, None)?
            } else {
                context.triples_for_pattern(None, None, Some(node))?
            };
            triples
                .into_iter()
                .filter(|(_, p, _)| !is_excluded(p, excluded))
                .map(|(s, _, o)| if forward { o } else { s })
                .collect()
        }
    })
}

/// Breadth-first traversal, returning `starts` and all the nodes reachable from them once each
fn closure(
    path: &PropertyPathExpression,
    starts: Vec<Term>,
    forward: bool,
    context: &ExecutionContext<'_>,
) -> Result<Vec<Term>, QueryEvaluationError> {
    let mut seen = FxHashSet::default();
    let mut output = Vec::new();
    let mut todo = Vec::new();
    for start in starts {
        if seen.insert(start.clone()) {
            output.push(start.clone());
            todo.push(start);
        }
    }
    while let Some(current) = todo.pop() {
        for next in step(path, &current, forward, context)? {
            if seen.insert(next.clone()) {
                output.push(next.clone());
                todo.push(next);
            }
        }
    }
    Ok(output)
}

fn is_excluded(predicate: &Term, excluded: &[NamedNode]) -> bool {
    match predicate {
        Term::NamedNode(p) => excluded.contains(p),
        _ => false,
    }
}
