use crate::algebra::Op;
use crate::bgp::is_hidden;
use crate::binding::Binding;
use crate::context::ExecutionContext;
use crate::dataset::QueryableDataset;
use crate::error::QueryEvaluationError;
use crate::eval::eval;
use crate::evaluator::Evaluator;
use crate::model::{QueryResults, QuerySolutionIter, QueryTripleIter};
use crate::options::EvaluationOptions;
use crate::quad::to_quad_form;
use crate::simple::SimpleEvaluator;
use crate::substitute::substitute;
use crate::table::Table;
use oxrdf::{BlankNode, NamedNode, Subject, Term, Triple, Variable};
use rustc_hash::{FxHashMap, FxHashSet};
use spargebra::Query;
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};
use std::sync::Arc;

/// The reference query engine: evaluates the algebra of a query with a [`SimpleEvaluator`].
///
/// ```
/// use oxrdf::{Dataset, GraphName, Literal, NamedNode, Quad};
/// use sparref::{QueryEngineRef, QueryResults};
/// use spargebra::Query;
///
/// let ex = NamedNode::new("http://example.com")?;
/// let mut dataset = Dataset::new();
/// dataset.insert(&Quad::new(ex.clone(), ex.clone(), Literal::from(1), GraphName::DefaultGraph));
///
/// let query = Query::parse("SELECT (?o + 1 AS ?next) WHERE { ?s ?p ?o }", None)?;
/// if let QueryResults::Solutions(mut solutions) = QueryEngineRef::default().execute(&query, &dataset)? {
///     assert_eq!(solutions.next().unwrap()?.get("next"), Some(&Literal::from(2).into()));
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct QueryEngineRef {
    options: Arc<EvaluationOptions>,
    quad_form: bool,
}

impl QueryEngineRef {
    /// Name of the engine in a [`QueryEngineRegistry`]
    pub const NAME: &'static str = "ref";

    pub fn new(options: EvaluationOptions) -> Self {
        Self {
            options: Arc::new(options),
            quad_form: false,
        }
    }

    #[inline]
    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    /// Evaluates an algebra tree.
    ///
    /// The variables bound in `input` are substituted in `op` before evaluation and every solution is compatible with `input`.
    pub fn eval<'a>(
        &self,
        op: &Op,
        dataset: impl QueryableDataset + 'a,
        input: &Binding,
    ) -> Result<QuerySolutionIter<'a>, QueryEvaluationError> {
        let context = ExecutionContext::new(dataset, Arc::clone(&self.options));
        if self.quad_form {
            evaluate(&to_quad_form(op), context, input)
        } else {
            evaluate(op, context, input)
        }
    }

    /// Evaluates a query.
    ///
    /// `FROM` and `FROM NAMED` clauses are ignored: the query is evaluated against `dataset`.
    pub fn execute<'a>(
        &self,
        query: &Query,
        dataset: impl QueryableDataset + 'a,
    ) -> Result<QueryResults<'a>, QueryEvaluationError> {
        self.execute_with_input(query, dataset, &Binding::new())
    }

    /// Evaluates a query with some variables already bound.
    ///
    /// ```
    /// use oxrdf::{Dataset, Literal, Variable};
    /// use sparref::{Binding, QueryEngineRef, QueryResults};
    /// use spargebra::Query;
    ///
    /// let query = Query::parse("SELECT ?x ?y WHERE { BIND(?x * 2 AS ?y) }", None)?;
    /// let input = Binding::singleton(Variable::new("x")?, Literal::from(21).into());
    /// if let QueryResults::Solutions(mut solutions) =
    ///     QueryEngineRef::default().execute_with_input(&query, &Dataset::new(), &input)?
    /// {
    ///     let solution = solutions.next().unwrap()?;
    ///     assert_eq!(solution.get("x"), Some(&Literal::from(21).into()));
    ///     assert_eq!(solution.get("y"), Some(&Literal::from(42).into()));
    /// }
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn execute_with_input<'a>(
        &self,
        query: &Query,
        dataset: impl QueryableDataset + 'a,
        input: &Binding,
    ) -> Result<QueryResults<'a>, QueryEvaluationError> {
        let (pattern, base_iri) = match query {
            Query::Select {
                pattern, base_iri, ..
            }
            | Query::Ask {
                pattern, base_iri, ..
            }
            | Query::Construct {
                pattern, base_iri, ..
            }
            | Query::Describe {
                pattern, base_iri, ..
            } => (pattern, base_iri),
        };
        let options = EvaluationOptions::clone(&self.options).with_default_base_iri(base_iri.as_ref());
        let context = ExecutionContext::new(dataset, options);
        let mut op = Op::from(pattern);
        if self.quad_form {
            op = to_quad_form(&op);
        }
        match query {
            Query::Select { .. } => Ok(evaluate(&op, context, input)?.into()),
            Query::Ask { .. } => match evaluate(&op, context, input)?.next() {
                Some(solution) => {
                    solution?;
                    Ok(true.into())
                }
                None => Ok(false.into()),
            },
            Query::Construct { template, .. } => {
                let solutions = evaluate(&op, context, input)?;
                Ok(QueryTripleIter::new(construct(template.clone(), solutions)).into())
            }
            Query::Describe { .. } => {
                let solutions = evaluate(&op, context.clone(), input)?;
                Ok(QueryTripleIter::new(describe(solutions, context)).into())
            }
        }
    }

    /// Adds the reference engine to `registry`
    pub fn register(registry: &mut QueryEngineRegistry) {
        registry.register(RefEngineFactory { quad_form: false });
    }

    /// Removes the reference engine from `registry`, returns if it was registered
    pub fn unregister(registry: &mut QueryEngineRegistry) -> bool {
        registry.unregister(Self::NAME)
    }
}

/// The reference query engine working on the [quad form](crate::to_quad_form) of the algebra.
///
/// It returns the same solutions as [`QueryEngineRef`].
#[derive(Clone, Default)]
pub struct QueryEngineRefQuad {
    inner: QueryEngineRef,
}

impl QueryEngineRefQuad {
    /// Name of the engine in a [`QueryEngineRegistry`]
    pub const NAME: &'static str = "ref-quad";

    pub fn new(options: EvaluationOptions) -> Self {
        Self {
            inner: QueryEngineRef {
                options: Arc::new(options),
                quad_form: true,
            },
        }
    }

    #[inline]
    pub fn options(&self) -> &EvaluationOptions {
        self.inner.options()
    }

    /// Evaluates an algebra tree, after rewriting it into quad form
    pub fn eval<'a>(
        &self,
        op: &Op,
        dataset: impl QueryableDataset + 'a,
        input: &Binding,
    ) -> Result<QuerySolutionIter<'a>, QueryEvaluationError> {
        self.inner.eval(op, dataset, input)
    }

    pub fn execute<'a>(
        &self,
        query: &Query,
        dataset: impl QueryableDataset + 'a,
    ) -> Result<QueryResults<'a>, QueryEvaluationError> {
        self.inner.execute(query, dataset)
    }

    pub fn execute_with_input<'a>(
        &self,
        query: &Query,
        dataset: impl QueryableDataset + 'a,
        input: &Binding,
    ) -> Result<QueryResults<'a>, QueryEvaluationError> {
        self.inner.execute_with_input(query, dataset, input)
    }

    pub fn register(registry: &mut QueryEngineRegistry) {
        registry.register(RefEngineFactory { quad_form: true });
    }

    pub fn unregister(registry: &mut QueryEngineRegistry) -> bool {
        registry.unregister(Self::NAME)
    }
}

/// Substitutes the input, evaluates, joins the result with the input and checks the solutions
fn evaluate<'a>(
    op: &Op,
    context: ExecutionContext<'a>,
    input: &Binding,
) -> Result<QuerySolutionIter<'a>, QueryEvaluationError> {
    let op = substitute(op, input);
    let strict = context.options().is_strict();
    if context.options().is_debug() {
        tracing::debug!(op = %op, input = %input, "evaluating algebra");
    }
    let evaluator = SimpleEvaluator::new(context);
    let table = eval(&evaluator, &op)?;
    let input_table = Table::from_bindings(input.variables().cloned().collect(), vec![input.clone()]);
    let table = evaluator.join(table, input_table)?;
    // Blank nodes of unprojected patterns are still bound to their hidden variables
    let variables: Arc<[Variable]> = table
        .variables()
        .iter()
        .filter(|v| !is_hidden(v))
        .cloned()
        .collect();
    let table = Table::lazy(
        variables.to_vec(),
        table.map(|row| Ok(row?.without(is_hidden))),
    );
    Ok(QuerySolutionIter::checked(variables, table, strict))
}

fn construct<'a>(
    template: Vec<TriplePattern>,
    solutions: QuerySolutionIter<'a>,
) -> impl Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a {
    let mut emitted = FxHashSet::default();
    solutions.into_bindings().flat_map(move |row| {
        let row = match row {
            Ok(row) => row,
            Err(e) => return vec![Err(e)],
        };
        // Fresh blank nodes for each solution
        let mut bnodes = FxHashMap::default();
        template
            .iter()
            .filter_map(|t| {
                triple(
                    template_value(&t.subject, &row, &mut bnodes)?,
                    match &t.predicate {
                        NamedNodePattern::NamedNode(p) => p.clone().into(),
                        NamedNodePattern::Variable(v) => row.get(v)?.clone(),
                    },
                    template_value(&t.object, &row, &mut bnodes)?,
                )
            })
            .filter(|t| emitted.insert(t.clone()))
            .map(Ok)
            .collect()
    })
}

fn template_value(
    pattern: &TermPattern,
    row: &Binding,
    bnodes: &mut FxHashMap<BlankNode, BlankNode>,
) -> Option<Term> {
    match pattern {
        TermPattern::NamedNode(t) => Some(t.clone().into()),
        TermPattern::Literal(t) => Some(t.clone().into()),
        TermPattern::BlankNode(b) => Some(bnodes.entry(b.clone()).or_default().clone().into()),
        TermPattern::Variable(v) => row.get(v).cloned(),
    }
}

/// Builds a triple if the terms are allowed in their positions
fn triple(subject: Term, predicate: Term, object: Term) -> Option<Triple> {
    let subject = match subject {
        Term::NamedNode(s) => Subject::from(s),
        Term::BlankNode(s) => Subject::from(s),
        _ => return None,
    };
    let Term::NamedNode(predicate) = predicate else {
        return None;
    };
    Some(Triple::new(subject, predicate, object))
}

/// The triples about each term of each solution, blank node objects being described too
fn describe<'a>(
    solutions: QuerySolutionIter<'a>,
    context: ExecutionContext<'a>,
) -> impl Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a {
    let mut described = FxHashSet::default();
    solutions.into_bindings().flat_map(move |row| {
        let row = match row {
            Ok(row) => row,
            Err(e) => return vec![Err(e)],
        };
        let mut todo = row
            .iter()
            .map(|(_, t)| t.clone())
            .filter(|t| described.insert(t.clone()))
            .collect::<Vec<_>>();
        let mut output = Vec::new();
        while let Some(node) = todo.pop() {
            let triples = match context.triples_for_pattern(Some(&node), None, None) {
                Ok(triples) => triples,
                Err(e) => {
                    output.push(Err(e));
                    break;
                }
            };
            for (s, p, o) in triples {
                if o.is_blank_node() && described.insert(o.clone()) {
                    todo.push(o.clone());
                }
                output.extend(triple(s, p, o).map(Ok));
            }
        }
        output
    })
}

/// Builds query engines for algebra trees.
///
/// Factories are kept in a [`QueryEngineRegistry`] that picks the most recently registered one accepting a given tree.
pub trait QueryEngineFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Returns if the engine is able to evaluate `op`
    fn accept(&self, op: &Op, options: &EvaluationOptions) -> bool;

    /// Prepares the evaluation of `op` in `context`, the variables of `input` being already bound
    fn create<'a>(
        &self,
        op: &Op,
        context: ExecutionContext<'a>,
        input: &Binding,
    ) -> Box<dyn Plan<'a> + 'a>;
}

/// A prepared evaluation
pub trait Plan<'a> {
    /// The algebra tree that is going to be evaluated, after the engine rewrites
    fn op(&self) -> &Op;

    fn execute(self: Box<Self>) -> Result<QuerySolutionIter<'a>, QueryEvaluationError>;
}

/// An ordered set of [`QueryEngineFactory`].
///
/// ```
/// use oxrdf::Dataset;
/// use sparref::algebra::Op;
/// use sparref::{
///     EvaluationOptions, ExecutionContext, QueryEngineRef, QueryEngineRefQuad, QueryEngineRegistry,
/// };
///
/// let mut registry = QueryEngineRegistry::new();
/// QueryEngineRef::register(&mut registry);
/// QueryEngineRefQuad::register(&mut registry);
/// let options = EvaluationOptions::default();
/// let factory = registry.find(&Op::unit(), &options).unwrap();
/// assert_eq!(factory.name(), QueryEngineRefQuad::NAME);
///
/// let dataset = Dataset::new();
/// let plan = factory.create(&Op::unit(), ExecutionContext::new(&dataset, options), &Default::default());
/// assert_eq!(plan.execute()?.count(), 1);
///
/// assert!(QueryEngineRefQuad::unregister(&mut registry));
/// assert_eq!(
///     registry.find(&Op::unit(), &EvaluationOptions::default()).unwrap().name(),
///     QueryEngineRef::NAME
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct QueryEngineRegistry {
    factories: Vec<Arc<dyn QueryEngineFactory>>,
}

impl QueryEngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: impl QueryEngineFactory + 'static) {
        self.factories.push(Arc::new(factory));
    }

    /// Removes the factories named `name`, returns if there was one
    pub fn unregister(&mut self, name: &str) -> bool {
        let len = self.factories.len();
        self.factories.retain(|f| f.name() != name);
        self.factories.len() != len
    }

    /// The most recently registered factory accepting `op`
    pub fn find(&self, op: &Op, options: &EvaluationOptions) -> Option<&dyn QueryEngineFactory> {
        self.factories
            .iter()
            .rev()
            .find(|f| f.accept(op, options))
            .map(|f| &**f)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().rev().map(|f| f.name())
    }
}

struct RefEngineFactory {
    quad_form: bool,
}

impl QueryEngineFactory for RefEngineFactory {
    fn name(&self) -> &str {
        if self.quad_form {
            QueryEngineRefQuad::NAME
        } else {
            QueryEngineRef::NAME
        }
    }

    fn accept(&self, _op: &Op, _options: &EvaluationOptions) -> bool {
        true
    }

    fn create<'a>(
        &self,
        op: &Op,
        context: ExecutionContext<'a>,
        input: &Binding,
    ) -> Box<dyn Plan<'a> + 'a> {
        Box::new(RefPlan {
            op: if self.quad_form {
                to_quad_form(op)
            } else {
                op.clone()
            },
            context,
            input: input.clone(),
        })
    }
}

struct RefPlan<'a> {
    op: Op,
    context: ExecutionContext<'a>,
    input: Binding,
}

impl<'a> Plan<'a> for RefPlan<'a> {
    fn op(&self) -> &Op {
        &self.op
    }

    fn execute(self: Box<Self>) -> Result<QuerySolutionIter<'a>, QueryEvaluationError> {
        let plan = *self;
        evaluate(&plan.op, plan.context, &plan.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Dataset, GraphName, Literal, Quad};

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new();
        let node = BlankNode::new_unchecked("n");
        dataset.insert(&Quad::new(ex("a"), ex("p"), node.clone(), GraphName::DefaultGraph));
        dataset.insert(&Quad::new(node, ex("q"), Literal::from(1), GraphName::DefaultGraph));
        dataset.insert(&Quad::new(ex("b"), ex("p"), Literal::from(2), GraphName::DefaultGraph));
        dataset
    }

    fn graph(query: &str) -> Vec<Triple> {
        let query = Query::parse(query, None).unwrap();
        let dataset = dataset();
        let QueryResults::Graph(triples) = QueryEngineRef::default().execute(&query, &dataset).unwrap()
        else {
            panic!("expected a graph")
        };
        triples.collect::<Result<_, _>>().unwrap()
    }

    #[test]
    fn ask() {
        let dataset = dataset();
        let ask = |q: &str| {
            let QueryResults::Boolean(b) = QueryEngineRef::default()
                .execute(&Query::parse(q, None).unwrap(), &dataset)
                .unwrap()
            else {
                panic!("expected a boolean")
            };
            b
        };
        assert!(ask("ASK { ?s <http://example.com/p> ?o }"));
        assert!(!ask("ASK { ?s <http://example.com/r> ?o }"));
    }

    #[test]
    fn construct_skips_ill_formed_triples() {
        // ?o is a literal for ex:b
        let triples = graph("CONSTRUCT { ?o <http://example.com/r> ?s } WHERE { ?s <http://example.com/p> ?o }");
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn construct_uses_fresh_blank_nodes_per_solution() {
        let triples = graph("CONSTRUCT { _:x <http://example.com/r> ?s } WHERE { ?s <http://example.com/p> ?o }");
        assert_eq!(triples.len(), 2);
        assert_ne!(triples[0].subject, triples[1].subject);
    }

    #[test]
    fn describe_follows_blank_nodes() {
        let triples = graph("DESCRIBE <http://example.com/a>");
        assert_eq!(triples.len(), 2);
    }

    #[test]
    fn base_iri_of_the_query_is_used() {
        let query = Query::parse(
            "BASE <http://example.com/> SELECT (IRI(\"a\") AS ?iri) WHERE {}",
            None,
        )
        .unwrap();
        let dataset = Dataset::new();
        let QueryResults::Solutions(mut solutions) =
            QueryEngineRef::default().execute(&query, &dataset).unwrap()
        else {
            panic!("expected solutions")
        };
        assert_eq!(
            solutions.next().unwrap().unwrap().get("iri"),
            Some(&ex("a").into())
        );
    }
}
