use crate::binding::Binding;
use crate::error::QueryEvaluationError;
use oxrdf::{Term, Variable};
use std::iter::Peekable;
use std::vec;

type BindingIter<'a> = Box<dyn Iterator<Item = Result<Binding, QueryEvaluationError>> + 'a>;

/// A bag of [`Binding`]s, the intermediate result of every algebra operator.
///
/// A table is single-pass: iterating it consumes it and it can not be restarted.
/// Whether rows are computed lazily or held in memory depends on how the table has been built:
/// [`Table::lazy`] wraps a lazy iterator, [`Table::from_bindings`] holds a materialized vector.
/// [`Table::contains`] materializes a lazy table in place.
///
/// Dropping a table releases the iterators it wraps.
///
/// ```
/// use oxrdf::{Literal, Variable};
/// use sparref::{Binding, Table};
///
/// let x = Variable::new("x")?;
/// let mut table = Table::from_bindings(
///     vec![x.clone()],
///     vec![Binding::singleton(x.clone(), Literal::from(1).into())],
/// );
/// assert!(!table.is_empty());
/// assert_eq!(table.into_bindings()?.len(), 1);
/// assert!(Table::empty().is_empty());
/// assert_eq!(Table::unit().into_bindings()?, vec![Binding::new()]);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct Table<'a> {
    variables: Vec<Variable>,
    rows: Rows<'a>,
}

enum Rows<'a> {
    Lazy(Peekable<BindingIter<'a>>),
    Materialized(vec::IntoIter<Binding>),
}

impl<'a> Table<'a> {
    /// The table without any row (materialized)
    pub fn empty() -> Self {
        Self::from_bindings(Vec::new(), Vec::new())
    }

    /// The table with a single empty binding, the identity of the join (materialized)
    pub fn unit() -> Self {
        Self::from_bindings(Vec::new(), vec![Binding::new()])
    }

    /// The table with a single row binding `variable` to `value` (materialized)
    pub fn singleton(variable: Variable, value: Term) -> Self {
        Self::from_bindings(
            vec![variable.clone()],
            vec![Binding::singleton(variable, value)],
        )
    }

    /// A table holding the given rows in memory
    pub fn from_bindings(variables: Vec<Variable>, bindings: Vec<Binding>) -> Self {
        Self {
            variables,
            rows: Rows::Materialized(bindings.into_iter()),
        }
    }

    /// A table lazily pulling its rows from `iter`
    pub fn lazy(
        variables: Vec<Variable>,
        iter: impl IntoIterator<Item = Result<Binding, QueryEvaluationError>> + 'a,
    ) -> Self {
        Self {
            variables,
            rows: Rows::Lazy((Box::new(iter.into_iter()) as BindingIter<'a>).peekable()),
        }
    }

    /// The variables the rows may bind
    ///
    /// Rows are not required to bind all of them.
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Returns if the table has no row.
    ///
    /// A lazy table computes its first row to answer and keeps it for the following iteration.
    /// A pending error counts as a row so that it is not lost.
    pub fn is_empty(&mut self) -> bool {
        match &mut self.rows {
            Rows::Lazy(iter) => iter.peek().is_none(),
            Rows::Materialized(iter) => iter.as_slice().is_empty(),
        }
    }

    /// Returns if some row of the table contains `binding`, i.e. binds all its variables to the same values.
    ///
    /// The table is materialized on the first call.
    pub fn contains(&mut self, binding: &Binding) -> Result<bool, QueryEvaluationError> {
        Ok(self
            .materialize()?
            .iter()
            .any(|row| binding.is_contained_in(row)))
    }

    fn materialize(&mut self) -> Result<&[Binding], QueryEvaluationError> {
        if let Rows::Lazy(iter) = &mut self.rows {
            let rows = iter.collect::<Result<Vec<_>, _>>()?;
            self.rows = Rows::Materialized(rows.into_iter());
        }
        Ok(match &self.rows {
            Rows::Materialized(iter) => iter.as_slice(),
            Rows::Lazy(_) => &[],
        })
    }

    /// Consumes the table into a vector of bindings, failing on the first error
    pub fn into_bindings(self) -> Result<Vec<Binding>, QueryEvaluationError> {
        match self.rows {
            Rows::Lazy(iter) => iter.collect(),
            Rows::Materialized(iter) => Ok(iter.collect()),
        }
    }

    /// Consumes the table and returns a materialized one with the same content
    pub(crate) fn into_materialized(self) -> Result<Self, QueryEvaluationError> {
        let variables = self.variables.clone();
        Ok(Self::from_bindings(variables, self.into_bindings()?))
    }

    /// Releases the table and the iterators it wraps
    pub fn close(self) {
        tracing::trace!(variables = ?self.variables, "closing table");
    }
}

impl Default for Table<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl Iterator for Table<'_> {
    type Item = Result<Binding, QueryEvaluationError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.rows {
            Rows::Lazy(iter) => iter.next(),
            Rows::Materialized(iter) => iter.next().map(Ok),
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.rows {
            Rows::Lazy(iter) => iter.size_hint(),
            Rows::Materialized(iter) => iter.size_hint(),
        }
    }
}

/// Union of two variable lists, keeping the order of first appearance
pub(crate) fn union_variables(left: &[Variable], right: &[Variable]) -> Vec<Variable> {
    let mut variables = left.to_vec();
    for v in right {
        if !variables.contains(v) {
            variables.push(v.clone());
        }
    }
    variables
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::Literal;
    use std::iter::once;

    fn row(name: &str, value: i64) -> Binding {
        Binding::singleton(Variable::new_unchecked(name), Literal::from(value).into())
    }

    #[test]
    fn is_empty_does_not_lose_rows() {
        let mut table = Table::lazy(
            vec![Variable::new_unchecked("x")],
            vec![Ok(row("x", 1)), Ok(row("x", 2))],
        );
        assert!(!table.is_empty());
        assert!(!table.is_empty());
        assert_eq!(table.into_bindings().unwrap().len(), 2);
    }

    #[test]
    fn is_empty_keeps_pending_errors() {
        let mut table = Table::lazy(Vec::new(), once(Err(QueryEvaluationError::UnboundService)));
        assert!(!table.is_empty());
        assert!(table.next().unwrap().is_err());
    }

    #[test]
    fn contains_materializes_lazy_tables() {
        let x = Variable::new_unchecked("x");
        let y = Variable::new_unchecked("y");
        let wide = row("x", 1).merge(&row("y", 2)).unwrap();
        let mut table = Table::lazy(vec![x, y], vec![Ok(wide.clone())]);
        assert!(table.contains(&row("x", 1)).unwrap());
        assert!(!table.contains(&row("x", 2)).unwrap());
        assert!(table.contains(&Binding::new()).unwrap());
        assert_eq!(table.into_bindings().unwrap(), vec![wide]);
    }

    #[test]
    fn unit_and_empty() {
        assert!(Table::empty().is_empty());
        assert_eq!(Table::unit().count(), 1);
        assert!(!Table::empty().contains(&Binding::new()).unwrap());
    }
}
