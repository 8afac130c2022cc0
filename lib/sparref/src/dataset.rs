use crate::error::QueryEvaluationError;
use oxrdf::{Dataset, GraphNameRef, QuadRef, Term, TermRef};
use rustc_hash::FxHashSet;
use std::convert::Infallible;
use std::error::Error;
use std::iter::empty;

/// A read-only view of an [RDF dataset](https://www.w3.org/TR/sparql11-query/#rdfDataset) the evaluator can query.
///
/// Only [`quads_for_pattern`](Self::quads_for_pattern) is required.
/// A named graph is considered to exist as soon as it contains a quad.
///
/// ```
/// use oxrdf::{Dataset, NamedNode, Quad};
/// use sparref::QueryableDataset;
///
/// let ex = NamedNode::new("http://example.com")?;
/// let mut dataset = Dataset::new();
/// dataset.insert(&Quad::new(ex.clone(), ex.clone(), ex.clone(), ex.clone()));
/// let graphs = dataset.named_graphs().collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(graphs, vec![ex.clone().into()]);
/// assert!(dataset.contains_graph_name(&ex.into())?);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait QueryableDataset {
    /// Error returned by the dataset.
    type Error: Error + Send + Sync + 'static;

    /// Fetches quads according to a pattern
    ///
    /// For `graph_name`, `None` matches any named graph (never the default graph),
    /// `Some(None)` encodes the default graph and `Some(Some(_))` a given named graph.
    fn quads_for_pattern<'b>(
        &'b self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph_name: Option<Option<&Term>>,
    ) -> Box<dyn Iterator<Item = Result<InternalQuad, Self::Error>> + 'b>;

    /// Fetches the names of the dataset named graphs, without duplicates
    fn named_graphs(&self) -> Box<dyn Iterator<Item = Result<Term, Self::Error>> + '_> {
        let mut seen = FxHashSet::default();
        Box::new(
            self.quads_for_pattern(None, None, None, None)
                .filter_map(move |quad| match quad {
                    Ok(quad) => {
                        let graph_name = quad.graph_name?;
                        seen.insert(graph_name.clone()).then_some(Ok(graph_name))
                    }
                    Err(e) => Some(Err(e)),
                }),
        )
    }

    /// Returns if the dataset contains a given named graph
    fn contains_graph_name(&self, graph_name: &Term) -> Result<bool, Self::Error> {
        Ok(self
            .quads_for_pattern(None, None, None, Some(Some(graph_name)))
            .next()
            .transpose()?
            .is_some())
    }
}

impl<T: QueryableDataset + ?Sized> QueryableDataset for &T {
    type Error = T::Error;

    #[inline]
    fn quads_for_pattern<'b>(
        &'b self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph_name: Option<Option<&Term>>,
    ) -> Box<dyn Iterator<Item = Result<InternalQuad, Self::Error>> + 'b> {
        (*self).quads_for_pattern(subject, predicate, object, graph_name)
    }

    #[inline]
    fn named_graphs(&self) -> Box<dyn Iterator<Item = Result<Term, Self::Error>> + '_> {
        (*self).named_graphs()
    }

    #[inline]
    fn contains_graph_name(&self, graph_name: &Term) -> Result<bool, Self::Error> {
        (*self).contains_graph_name(graph_name)
    }
}

impl QueryableDataset for Dataset {
    type Error = Infallible;

    fn quads_for_pattern<'b>(
        &'b self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph_name: Option<Option<&Term>>,
    ) -> Box<dyn Iterator<Item = Result<InternalQuad, Infallible>> + 'b> {
        let quads: Box<dyn Iterator<Item = QuadRef<'b>> + 'b> = match graph_name {
            Some(Some(Term::NamedNode(graph_name))) => {
                Box::new(self.quads_for_graph_name(graph_name.as_ref()))
            }
            Some(Some(Term::BlankNode(graph_name))) => {
                Box::new(self.quads_for_graph_name(graph_name.as_ref()))
            }
            Some(Some(Term::Literal(_))) => return Box::new(empty()),
            Some(None) => Box::new(self.quads_for_graph_name(GraphNameRef::DefaultGraph)),
            None => Box::new(self.iter().filter(|q| !q.graph_name.is_default_graph())),
        };
        let subject = subject.cloned();
        let predicate = predicate.cloned();
        let object = object.cloned();
        Box::new(
            quads
                .filter(move |q| {
                    subject
                        .as_ref()
                        .is_none_or(|s| TermRef::from(q.subject) == s.as_ref())
                        && predicate
                            .as_ref()
                            .is_none_or(|p| TermRef::from(q.predicate) == p.as_ref())
                        && object.as_ref().is_none_or(|o| q.object == o.as_ref())
                })
                .map(|q| Ok(q.into())),
        )
    }
}

/// A quad returned by [`QueryableDataset::quads_for_pattern`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalQuad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    /// `None` if the quad is in the default graph
    pub graph_name: Option<Term>,
}

impl From<QuadRef<'_>> for InternalQuad {
    fn from(quad: QuadRef<'_>) -> Self {
        Self {
            subject: TermRef::from(quad.subject).into_owned(),
            predicate: quad.predicate.into_owned().into(),
            object: quad.object.into_owned(),
            graph_name: match quad.graph_name {
                GraphNameRef::NamedNode(g) => Some(g.into_owned().into()),
                GraphNameRef::BlankNode(g) => Some(g.into_owned().into()),
                GraphNameRef::DefaultGraph => None,
            },
        }
    }
}

/// Object safe view of a [`QueryableDataset`] that materializes lookups and unifies errors.
pub(crate) trait ErasedDataset {
    fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph_name: Option<Option<&Term>>,
    ) -> Result<Vec<InternalQuad>, QueryEvaluationError>;

    fn graph_names(&self) -> Result<Vec<Term>, QueryEvaluationError>;

    fn has_graph(&self, graph_name: &Term) -> Result<bool, QueryEvaluationError>;
}

impl<D: QueryableDataset> ErasedDataset for D {
    fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph_name: Option<Option<&Term>>,
    ) -> Result<Vec<InternalQuad>, QueryEvaluationError> {
        self.quads_for_pattern(subject, predicate, object, graph_name)
            .map(|q| q.map_err(wrap_dataset_error))
            .collect()
    }

    fn graph_names(&self) -> Result<Vec<Term>, QueryEvaluationError> {
        self.named_graphs()
            .map(|g| g.map_err(wrap_dataset_error))
            .collect()
    }

    fn has_graph(&self, graph_name: &Term) -> Result<bool, QueryEvaluationError> {
        self.contains_graph_name(graph_name)
            .map_err(wrap_dataset_error)
    }
}

fn wrap_dataset_error(error: impl Error + Send + Sync + 'static) -> QueryEvaluationError {
    let error: Box<dyn Error + Send + Sync> = Box::new(error);
    match error.downcast() {
        Ok(error) => *error,
        Err(error) => QueryEvaluationError::Dataset(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{GraphName, Literal, NamedNode, Quad};

    fn dataset() -> Dataset {
        let ex = NamedNode::new_unchecked("http://example.com/s");
        let p = NamedNode::new_unchecked("http://example.com/p");
        let g = NamedNode::new_unchecked("http://example.com/g");
        let mut dataset = Dataset::new();
        dataset.insert(&Quad::new(
            ex.clone(),
            p.clone(),
            Literal::from("default"),
            GraphName::DefaultGraph,
        ));
        dataset.insert(&Quad::new(ex.clone(), p.clone(), Literal::from("g1"), g.clone()));
        dataset.insert(&Quad::new(ex, p, Literal::from("g2"), g));
        dataset
    }

    #[test]
    fn graph_name_selection() {
        let dataset = dataset();
        let g = Term::from(NamedNode::new_unchecked("http://example.com/g"));
        assert_eq!(dataset.find(None, None, None, Some(None)).unwrap().len(), 1);
        assert_eq!(dataset.find(None, None, None, Some(Some(&g))).unwrap().len(), 2);
        assert_eq!(dataset.find(None, None, None, None).unwrap().len(), 2);
        let object = Term::from(Literal::from("g2"));
        let quads = dataset.find(None, None, Some(&object), None).unwrap();
        assert_eq!(quads.len(), 1);
        assert_eq!(quads[0].graph_name, Some(g));
    }

    #[test]
    fn named_graphs_are_deduplicated() {
        let dataset = dataset();
        assert_eq!(dataset.graph_names().unwrap().len(), 1);
        assert!(
            !dataset
                .has_graph(&NamedNode::new_unchecked("http://example.com/other").into())
                .unwrap()
        );
    }
}
