use crate::binding::Binding;
use crate::error::QueryEvaluationError;
use crate::table::Table;
use oxrdf::{Triple, Variable};
pub use sparesults::QuerySolution;
use std::sync::Arc;

/// Results of a [SPARQL query](https://www.w3.org/TR/sparql11-query/).
pub enum QueryResults<'a> {
    /// Results of a [SELECT](https://www.w3.org/TR/sparql11-query/#select) query.
    Solutions(QuerySolutionIter<'a>),
    /// Result of a [ASK](https://www.w3.org/TR/sparql11-query/#ask) query.
    Boolean(bool),
    /// Results of a [CONSTRUCT](https://www.w3.org/TR/sparql11-query/#construct) or [DESCRIBE](https://www.w3.org/TR/sparql11-query/#describe) query.
    Graph(QueryTripleIter<'a>),
}

impl<'a> From<QuerySolutionIter<'a>> for QueryResults<'a> {
    #[inline]
    fn from(value: QuerySolutionIter<'a>) -> Self {
        Self::Solutions(value)
    }
}

impl From<bool> for QueryResults<'_> {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<'a> From<QueryTripleIter<'a>> for QueryResults<'a> {
    #[inline]
    fn from(value: QueryTripleIter<'a>) -> Self {
        Self::Graph(value)
    }
}

/// An iterator over [`QuerySolution`]s.
///
/// ```
/// use oxrdf::Dataset;
/// use sparref::{QueryEngineRef, QueryResults};
/// use spargebra::Query;
///
/// let query = Query::parse("SELECT ?s ?o WHERE { ?s ?p ?o }", None)?;
/// if let QueryResults::Solutions(solutions) =
///     QueryEngineRef::default().execute(&query, &Dataset::new())?
/// {
///     for solution in solutions {
///         println!("{:?}", solution?.get("s"));
///     }
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct QuerySolutionIter<'a> {
    variables: Arc<[Variable]>,
    iter: Box<dyn Iterator<Item = Result<QuerySolution, QueryEvaluationError>> + 'a>,
}

impl<'a> QuerySolutionIter<'a> {
    /// Construct a new iterator of solutions from an ordered list of solution variables and an iterator of solutions
    pub fn new(
        variables: Arc<[Variable]>,
        iter: impl IntoIterator<Item = Result<QuerySolution, QueryEvaluationError>> + 'a,
    ) -> Self {
        Self {
            variables,
            iter: Box::new(iter.into_iter()),
        }
    }

    /// Wraps a table, checking that each row only binds variables of `variables`.
    ///
    /// A row binding another variable is reported with a warning, or with
    /// [`QueryEvaluationError::UnexpectedVariable`] if `strict` is set.
    /// Rows are otherwise passed through unchanged.
    pub(crate) fn checked(variables: Arc<[Variable]>, table: Table<'a>, strict: bool) -> Self {
        let schema = Arc::clone(&variables);
        Self::new(
            variables,
            table.map(move |row| {
                let row = row?;
                if let Some(unexpected) = row.variables().find(|v| !schema.contains(v)) {
                    if strict {
                        return Err(QueryEvaluationError::UnexpectedVariable(
                            unexpected.clone(),
                        ));
                    }
                    tracing::warn!(
                        variable = %unexpected,
                        solution = %row,
                        "solution binds a variable outside of the result variables"
                    );
                }
                Ok(row.to_solution(&schema))
            }),
        )
    }

    /// The variables used in the solutions.
    ///
    /// ```
    /// use oxrdf::{Dataset, Variable};
    /// use sparref::{QueryEngineRef, QueryResults};
    /// use spargebra::Query;
    ///
    /// let query = Query::parse("SELECT ?s ?o WHERE { ?s ?p ?o }", None)?;
    /// if let QueryResults::Solutions(solutions) =
    ///     QueryEngineRef::default().execute(&query, &Dataset::new())?
    /// {
    ///     assert_eq!(
    ///         solutions.variables(),
    ///         &[Variable::new("s")?, Variable::new("o")?]
    ///     );
    /// }
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Converts back the solutions into [`Binding`]s
    pub fn into_bindings(self) -> impl Iterator<Item = Result<Binding, QueryEvaluationError>> + 'a {
        self.iter.map(|s| Ok(Binding::from(&s?)))
    }
}

impl Iterator for QuerySolutionIter<'_> {
    type Item = Result<QuerySolution, QueryEvaluationError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

/// An iterator over the triples that compose a graph solution.
///
/// ```
/// use oxrdf::Dataset;
/// use sparref::{QueryEngineRef, QueryResults};
/// use spargebra::Query;
///
/// let query = Query::parse("CONSTRUCT WHERE { ?s ?p ?o }", None)?;
/// if let QueryResults::Graph(triples) = QueryEngineRef::default().execute(&query, &Dataset::new())? {
///     for triple in triples {
///         println!("{}", triple?);
///     }
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct QueryTripleIter<'a> {
    iter: Box<dyn Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a>,
}

impl<'a> QueryTripleIter<'a> {
    pub(crate) fn new(
        iter: impl Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a,
    ) -> Self {
        Self {
            iter: Box::new(iter),
        }
    }
}

impl Iterator for QueryTripleIter<'_> {
    type Item = Result<Triple, QueryEvaluationError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::Literal;

    fn table() -> Table<'static> {
        let x = Variable::new_unchecked("x");
        let y = Variable::new_unchecked("y");
        Table::from_bindings(
            vec![x.clone(), y.clone()],
            vec![
                Binding::singleton(x, Literal::from(1).into()),
                Binding::singleton(y, Literal::from(2).into()),
            ],
        )
    }

    #[test]
    fn checked_lenient_passes_rows_through() {
        let variables: Arc<[Variable]> = [Variable::new_unchecked("x")].into();
        let solutions = QuerySolutionIter::checked(variables, table(), false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(solutions.len(), 2);
        assert_eq!(solutions[0].get("x"), Some(&Literal::from(1).into()));
        assert_eq!(solutions[1].get("x"), None);
    }

    #[test]
    fn checked_strict_reports_unexpected_variables() {
        let variables: Arc<[Variable]> = [Variable::new_unchecked("x")].into();
        let mut solutions = QuerySolutionIter::checked(variables, table(), true);
        assert!(solutions.next().unwrap().is_ok());
        assert!(matches!(
            solutions.next().unwrap(),
            Err(QueryEvaluationError::UnexpectedVariable(v)) if v.as_str() == "y"
        ));
    }
}
