//! Basic graph pattern matching.

use crate::algebra::PropFuncArg;
use crate::binding::Binding;
use crate::context::ExecutionContext;
use crate::error::QueryEvaluationError;
use crate::property_function::{PropertyFunctionRegistry, call_property_function};
use crate::table::{Table, union_variables};
use oxrdf::vocab::rdf;
use oxrdf::{BlankNode, NamedNode, Term, Variable};
use rustc_hash::{FxHashMap, FxHashSet};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};

/// Evaluates a basic graph pattern on top of an input table.
///
/// Set with [`EvaluationOptions::with_stage_generator`](crate::EvaluationOptions::with_stage_generator)
/// to replace the way triple patterns are matched, e.g. to reorder them.
///
/// ```
/// use oxrdf::Dataset;
/// use sparref::{
///     EvaluationOptions, ExecutionContext, QueryEngineRef, QueryEvaluationError, QueryResults,
///     SimpleStageGenerator, StageGenerator, Table,
/// };
/// use spargebra::Query;
/// use spargebra::term::TriplePattern;
///
/// /// Matches the patterns in reverse order
/// struct Reversed;
///
/// impl StageGenerator for Reversed {
///     fn execute<'a>(
///         &self,
///         input: Table<'a>,
///         patterns: &[TriplePattern],
///         context: &ExecutionContext<'a>,
///     ) -> Result<Table<'a>, QueryEvaluationError> {
///         let reversed = patterns.iter().rev().cloned().collect::<Vec<_>>();
///         SimpleStageGenerator.execute(input, &reversed, context)
///     }
/// }
///
/// let options = EvaluationOptions::default().with_stage_generator(Reversed);
/// let query = Query::parse("SELECT * WHERE { ?s ?p ?o . ?o ?p2 ?o2 }", None)?;
/// if let QueryResults::Solutions(solutions) =
///     QueryEngineRef::new(options).execute(&query, &Dataset::new())?
/// {
///     assert_eq!(solutions.count(), 0);
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait StageGenerator {
    /// Returns the solutions of `input` extended with the matches of `patterns` in the active graph of `context`
    fn execute<'a>(
        &self,
        input: Table<'a>,
        patterns: &[TriplePattern],
        context: &ExecutionContext<'a>,
    ) -> Result<Table<'a>, QueryEvaluationError>;
}

/// The default [`StageGenerator`].
///
/// Triple patterns are matched one after the other, in the given order, by nested index lookups.
/// Blank nodes are bound to hidden variables, so that the patterns of a group sharing a blank node join on it.
/// They are dropped by projection and never reach the query results.
/// A triple whose predicate is a registered [property function](crate::PropertyFunction) calls it instead,
/// its subject and object being read as lists if they are RDF collections written in the pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleStageGenerator;

impl StageGenerator for SimpleStageGenerator {
    fn execute<'a>(
        &self,
        input: Table<'a>,
        patterns: &[TriplePattern],
        context: &ExecutionContext<'a>,
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let stages = stages(patterns, context.options().property_functions());
        let mut visible = Vec::new();
        for stage in &stages {
            for v in stage.variables() {
                if !visible.contains(v) {
                    visible.push(v.clone());
                }
            }
        }
        let variables = union_variables(input.variables(), &visible);
        let mut table = input;
        for stage in stages {
            if let Stage::PropertyFunction {
                name,
                subject,
                object,
            } = &stage
            {
                if let Some(function) = context.options().property_functions().get(name) {
                    function
                        .build(subject, object)
                        .map_err(QueryEvaluationError::PropertyFunction)?;
                }
            }
            let context = context.clone();
            let table_variables = table.variables().to_vec();
            table = Table::lazy(
                table_variables,
                table.flat_map(move |row| match row.and_then(|row| stage.run(&row, &context)) {
                    Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(e) => vec![Err(e)],
                }),
            );
        }
        Ok(Table::lazy(variables, table))
    }
}

/// The variable standing for a blank node of a pattern.
///
/// Its name starts with `?`, which no parsed variable can.
pub(crate) fn hidden_variable(bnode: &BlankNode) -> Variable {
    Variable::new_unchecked(format!("?{}", bnode.as_str()))
}

pub(crate) fn is_hidden(variable: &Variable) -> bool {
    variable.as_str().starts_with('?')
}

/// Replaces a blank node by its hidden variable
pub(crate) fn hide_blank_node(pattern: &TermPattern) -> TermPattern {
    match pattern {
        TermPattern::BlankNode(b) => TermPattern::Variable(hidden_variable(b)),
        _ => pattern.clone(),
    }
}

enum Stage {
    Triple(TriplePattern),
    PropertyFunction {
        name: NamedNode,
        subject: PropFuncArg,
        object: PropFuncArg,
    },
}

impl Stage {
    fn variables(&self) -> Vec<&Variable> {
        let nodes: Vec<&TermPattern> = match self {
            Self::Triple(t) => vec![&t.subject, &t.object],
            Self::PropertyFunction {
                subject, object, ..
            } => subject.nodes().iter().chain(object.nodes()).collect(),
        };
        let mut variables = nodes
            .into_iter()
            .filter_map(|n| match n {
                TermPattern::Variable(v) => Some(v),
                _ => None,
            })
            .collect::<Vec<_>>();
        if let Self::Triple(TriplePattern {
            predicate: NamedNodePattern::Variable(v),
            ..
        }) = self
        {
            variables.insert(1, v);
        }
        variables
    }

    fn run(
        &self,
        row: &Binding,
        context: &ExecutionContext<'_>,
    ) -> Result<Vec<Binding>, QueryEvaluationError> {
        match self {
            Self::Triple(pattern) => match_triple(pattern, row, context),
            Self::PropertyFunction {
                name,
                subject,
                object,
            } => call_property_function(name, subject, object, row, context),
        }
    }
}

/// Splits the pattern into matching and property function stages, blank nodes replaced by hidden variables.
///
/// The `rdf:first`/`rdf:rest` triples describing a list argument of a property function are consumed by it.
fn stages(patterns: &[TriplePattern], registry: &PropertyFunctionRegistry) -> Vec<Stage> {
    let calls = patterns
        .iter()
        .enumerate()
        .filter_map(|(i, t)| match &t.predicate {
            NamedNodePattern::NamedNode(p) if registry.contains(p) => Some(i),
            _ => None,
        })
        .collect::<Vec<_>>();
    if calls.is_empty() {
        return patterns
            .iter()
            .map(|t| Stage::Triple(hide_triple(t)))
            .collect();
    }

    let mut firsts = FxHashMap::default();
    let mut rests = FxHashMap::default();
    for (i, t) in patterns.iter().enumerate() {
        if let (TermPattern::BlankNode(b), NamedNodePattern::NamedNode(p)) =
            (&t.subject, &t.predicate)
        {
            if p.as_ref() == rdf::FIRST {
                firsts.insert(b.clone(), (i, t.object.clone()));
            } else if p.as_ref() == rdf::REST {
                rests.insert(b.clone(), (i, t.object.clone()));
            }
        }
    }
    let mut consumed = FxHashSet::default();
    let mut functions = FxHashMap::default();
    for i in calls {
        let t = &patterns[i];
        let NamedNodePattern::NamedNode(name) = &t.predicate else {
            continue;
        };
        let subject = argument(&t.subject, &firsts, &rests, &mut consumed);
        let object = argument(&t.object, &firsts, &rests, &mut consumed);
        functions.insert(
            i,
            Stage::PropertyFunction {
                name: name.clone(),
                subject,
                object,
            },
        );
    }
    patterns
        .iter()
        .enumerate()
        .filter_map(|(i, t)| {
            if let Some(function) = functions.remove(&i) {
                Some(function)
            } else if consumed.contains(&i) {
                None
            } else {
                Some(Stage::Triple(hide_triple(t)))
            }
        })
        .collect()
}

/// Reads a property function argument, as a list if it is the head of a list written in the pattern
fn argument(
    node: &TermPattern,
    firsts: &FxHashMap<BlankNode, (usize, TermPattern)>,
    rests: &FxHashMap<BlankNode, (usize, TermPattern)>,
    consumed: &mut FxHashSet<usize>,
) -> PropFuncArg {
    if matches!(node, TermPattern::NamedNode(n) if n.as_ref() == rdf::NIL) {
        return PropFuncArg::List(Vec::new());
    }
    let mut elements = Vec::new();
    let mut used = Vec::new();
    let mut current = node;
    loop {
        match current {
            TermPattern::NamedNode(n) if n.as_ref() == rdf::NIL => break,
            TermPattern::BlankNode(b) => {
                let (Some((first_index, first)), Some((rest_index, rest))) =
                    (firsts.get(b), rests.get(b))
                else {
                    return PropFuncArg::Node(hide_blank_node(node));
                };
                if used.contains(first_index) {
                    // cycle
                    return PropFuncArg::Node(hide_blank_node(node));
                }
                elements.push(hide_blank_node(first));
                used.extend([*first_index, *rest_index]);
                current = rest;
            }
            _ => return PropFuncArg::Node(hide_blank_node(node)),
        }
    }
    consumed.extend(used);
    PropFuncArg::List(elements)
}

fn hide_triple(pattern: &TriplePattern) -> TriplePattern {
    TriplePattern {
        subject: hide_blank_node(&pattern.subject),
        predicate: pattern.predicate.clone(),
        object: hide_blank_node(&pattern.object),
    }
}

/// The value of a pattern position for a given row, `None` if it is still unbound
fn resolve(pattern: &TermPattern, row: &Binding) -> Option<Term> {
    match pattern {
        TermPattern::NamedNode(t) => Some(t.clone().into()),
        TermPattern::BlankNode(t) => Some(t.clone().into()),
        TermPattern::Literal(t) => Some(t.clone().into()),
        TermPattern::Variable(v) => row.get(v).cloned(),
    }
}

/// Binds `variable` to `value`, or checks that it is already bound to it
pub(crate) fn bind(row: Binding, variable: Option<&Variable>, value: Term) -> Option<Binding> {
    let Some(variable) = variable else {
        return Some(row);
    };
    match row.get(variable) {
        Some(existing) => (*existing == value).then_some(row),
        None => row.extended(variable.clone(), value),
    }
}

fn match_triple(
    pattern: &TriplePattern,
    row: &Binding,
    context: &ExecutionContext<'_>,
) -> Result<Vec<Binding>, QueryEvaluationError> {
    let subject = resolve(&pattern.subject, row);
    let predicate = match &pattern.predicate {
        NamedNodePattern::NamedNode(p) => Some(p.clone().into()),
        NamedNodePattern::Variable(v) => row.get(v).cloned(),
    };
    let object = resolve(&pattern.object, row);
    let as_variable = |p: &TermPattern| match p {
        TermPattern::Variable(v) => Some(v.clone()),
        _ => None,
    };
    let subject_variable = as_variable(&pattern.subject);
    let predicate_variable = match &pattern.predicate {
        NamedNodePattern::Variable(v) => Some(v.clone()),
        NamedNodePattern::NamedNode(_) => None,
    };
    let object_variable = as_variable(&pattern.object);
    Ok(context
        .triples_for_pattern(subject.as_ref(), predicate.as_ref(), object.as_ref())?
        .into_iter()
        .filter_map(|(s, p, o)| {
            let row = bind(row.clone(), subject_variable.as_ref(), s)?;
            let row = bind(row, predicate_variable.as_ref(), p)?;
            bind(row, object_variable.as_ref(), o)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EvaluationOptions;
    use crate::property_function::LIST_MEMBER;
    use oxrdf::{Dataset, GraphName, Literal, Quad};

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new();
        for (s, o) in [("a", "b"), ("b", "c"), ("c", "c")] {
            dataset.insert(&Quad::new(ex(s), ex("p"), ex(o), GraphName::DefaultGraph));
        }
        dataset
    }

    fn run(patterns: &[TriplePattern], dataset: &Dataset) -> Vec<Binding> {
        let context = ExecutionContext::new(dataset, EvaluationOptions::default());
        SimpleStageGenerator
            .execute(Table::unit(), patterns, &context)
            .unwrap()
            .into_bindings()
            .unwrap()
    }

    fn triple(s: TermPattern, p: NamedNode, o: TermPattern) -> TriplePattern {
        TriplePattern {
            subject: s,
            predicate: p.into(),
            object: o,
        }
    }

    #[test]
    fn repeated_variable_must_match_the_same_term() {
        let x = Variable::new_unchecked("x");
        let rows = run(
            &[triple(x.clone().into(), ex("p"), x.clone().into())],
            &dataset(),
        );
        assert_eq!(rows, vec![Binding::singleton(x, ex("c").into())]);
    }

    #[test]
    fn blank_nodes_join_through_hidden_variables() {
        let x = Variable::new_unchecked("x");
        let b = BlankNode::new_unchecked("b");
        let rows = run(
            &[
                triple(x.clone().into(), ex("p"), b.clone().into()),
                triple(b.clone().into(), ex("p"), ex("c").into()),
            ],
            &dataset(),
        );
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.len() == 2 && r.contains(&x)));
        assert!(rows.iter().all(|r| r.contains(&hidden_variable(&b))));
        assert!(rows.iter().all(|r| r.without(is_hidden).len() == 1));
    }

    #[test]
    fn written_lists_become_property_function_arguments() {
        let m = Variable::new_unchecked("m");
        let (l1, l2) = (BlankNode::new_unchecked("l1"), BlankNode::new_unchecked("l2"));
        let patterns = [
            triple(l1.clone().into(), rdf::FIRST.into_owned(), Literal::from(1).into()),
            triple(l1.clone().into(), rdf::REST.into_owned(), l2.clone().into()),
            triple(l2.clone().into(), rdf::FIRST.into_owned(), Literal::from(2).into()),
            triple(l2.into(), rdf::REST.into_owned(), rdf::NIL.into_owned().into()),
            triple(l1.into(), LIST_MEMBER.into_owned(), m.clone().into()),
        ];
        let stages = stages(&patterns, &PropertyFunctionRegistry::with_standard_functions());
        assert_eq!(stages.len(), 1);
        let Stage::PropertyFunction { subject, .. } = &stages[0] else {
            panic!("expected a property function call")
        };
        assert_eq!(
            subject,
            &PropFuncArg::List(vec![Literal::from(1).into(), Literal::from(2).into()])
        );
    }
}
