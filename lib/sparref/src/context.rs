use crate::dataset::{ErasedDataset, QueryableDataset};
use crate::error::QueryEvaluationError;
use crate::options::EvaluationOptions;
use oxrdf::Term;
use oxsdatatypes::DateTime;
use rustc_hash::FxHashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// The graph basic graph patterns are matched against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActiveGraph {
    DefaultGraph,
    NamedGraph(Term),
    /// The union of all named graphs
    Union,
}

/// Everything an operator needs besides its input tables: the dataset, the active graph and the options.
///
/// A context is immutable. Crossing into another active graph builds a new one with
/// [`with_active_graph`](Self::with_active_graph); the dataset and options are shared.
/// `NOW()` returns the same value during the whole evaluation.
#[derive(Clone)]
pub struct ExecutionContext<'a> {
    dataset: Rc<dyn ErasedDataset + 'a>,
    active_graph: ActiveGraph,
    options: Arc<EvaluationOptions>,
    now: DateTime,
}

impl<'a> ExecutionContext<'a> {
    /// A context with the default graph active (or the union of the named graphs if the options ask for it)
    pub fn new(
        dataset: impl QueryableDataset + 'a,
        options: impl Into<Arc<EvaluationOptions>>,
    ) -> Self {
        let options = options.into();
        Self {
            dataset: Rc::new(dataset),
            active_graph: if options.is_union_default_graph() {
                ActiveGraph::Union
            } else {
                ActiveGraph::DefaultGraph
            },
            options,
            now: DateTime::now(),
        }
    }

    #[inline]
    pub fn active_graph(&self) -> &ActiveGraph {
        &self.active_graph
    }

    /// Same context, another active graph
    #[must_use]
    pub fn with_active_graph(&self, active_graph: ActiveGraph) -> Self {
        Self {
            dataset: Rc::clone(&self.dataset),
            active_graph,
            options: Arc::clone(&self.options),
            now: self.now,
        }
    }

    #[inline]
    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    #[inline]
    pub fn now(&self) -> DateTime {
        self.now
    }

    /// Triples of the active graph matching the given pattern
    pub fn triples_for_pattern(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
    ) -> Result<Vec<(Term, Term, Term)>, QueryEvaluationError> {
        let quads = match &self.active_graph {
            ActiveGraph::DefaultGraph => self.dataset.find(subject, predicate, object, Some(None))?,
            ActiveGraph::NamedGraph(g) => {
                self.dataset.find(subject, predicate, object, Some(Some(g)))?
            }
            ActiveGraph::Union => {
                let mut seen = FxHashSet::default();
                return Ok(self
                    .dataset
                    .find(subject, predicate, object, None)?
                    .into_iter()
                    .map(|q| (q.subject, q.predicate, q.object))
                    .filter(|t| seen.insert(t.clone()))
                    .collect());
            }
        };
        Ok(quads
            .into_iter()
            .map(|q| (q.subject, q.predicate, q.object))
            .collect())
    }

    /// Names of the named graphs of the dataset
    pub fn named_graphs(&self) -> Result<Vec<Term>, QueryEvaluationError> {
        self.dataset.graph_names()
    }

    pub fn contains_graph(&self, graph_name: &Term) -> Result<bool, QueryEvaluationError> {
        self.dataset.has_graph(graph_name)
    }

    /// Subjects and objects of the active graph, the domain of zero-length paths
    pub(crate) fn graph_nodes(&self) -> Result<Vec<Term>, QueryEvaluationError> {
        let mut seen = FxHashSet::default();
        let mut nodes = Vec::new();
        for (s, _, o) in self.triples_for_pattern(None, None, None)? {
            for node in [s, o] {
                if seen.insert(node.clone()) {
                    nodes.push(node);
                }
            }
        }
        Ok(nodes)
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("active_graph", &self.active_graph)
            .field("options", &self.options)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Dataset, GraphName, NamedNode, Quad};

    #[test]
    fn union_graph_deduplicates_triples() {
        let ex = NamedNode::new_unchecked("http://example.com/s");
        let g1 = NamedNode::new_unchecked("http://example.com/g1");
        let g2 = NamedNode::new_unchecked("http://example.com/g2");
        let mut dataset = Dataset::new();
        dataset.insert(&Quad::new(ex.clone(), ex.clone(), ex.clone(), g1));
        dataset.insert(&Quad::new(ex.clone(), ex.clone(), ex.clone(), g2));
        dataset.insert(&Quad::new(
            ex.clone(),
            ex.clone(),
            NamedNode::new_unchecked("http://example.com/o"),
            GraphName::DefaultGraph,
        ));
        let context = ExecutionContext::new(&dataset, EvaluationOptions::default());
        assert_eq!(
            context.triples_for_pattern(None, None, None).unwrap().len(),
            1
        );
        let union = context.with_active_graph(ActiveGraph::Union);
        assert_eq!(union.triples_for_pattern(None, None, None).unwrap().len(), 1);
        assert_eq!(union.named_graphs().unwrap().len(), 2);
        assert_eq!(union.graph_nodes().unwrap().len(), 1);
        assert_eq!(context.graph_nodes().unwrap().len(), 2);
    }

    #[test]
    fn union_default_graph_option() {
        let dataset = Dataset::new();
        let context = ExecutionContext::new(
            &dataset,
            EvaluationOptions::default().with_union_default_graph(),
        );
        assert_eq!(context.active_graph(), &ActiveGraph::Union);
    }
}
