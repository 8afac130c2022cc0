use oxrdf::{Term, Variable};
use sparesults::QuerySolution;
use std::fmt;
use std::sync::Arc;

/// An immutable mapping from variables to RDF terms: one SPARQL solution.
///
/// Entries are kept sorted by variable name so that two bindings with the same content are equal
/// and hash the same whatever the order in which they have been built.
///
/// ```
/// use oxrdf::{Literal, Variable};
/// use sparref::Binding;
///
/// let x = Variable::new("x")?;
/// let y = Variable::new("y")?;
/// let a = Binding::singleton(x.clone(), Literal::from(1).into());
/// let b = Binding::singleton(y.clone(), Literal::from(2).into());
/// assert!(a.is_compatible(&b));
/// assert!(a.is_disjoint(&b));
/// let merged = a.merge(&b).unwrap();
/// assert_eq!(merged.len(), 2);
/// assert!(a.is_contained_in(&merged));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Binding {
    entries: Vec<(Variable, Term)>,
}

impl Binding {
    /// The binding without any variable
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A binding with a single variable
    #[inline]
    pub fn singleton(variable: Variable, value: Term) -> Self {
        Self {
            entries: vec![(variable, value)],
        }
    }

    fn position(&self, variable: &Variable) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|(v, _)| v.as_str().cmp(variable.as_str()))
    }

    /// The value bound to `variable`, if any
    #[inline]
    pub fn get(&self, variable: &Variable) -> Option<&Term> {
        let i = self.position(variable).ok()?;
        Some(&self.entries[i].1)
    }

    #[inline]
    pub fn contains(&self, variable: &Variable) -> bool {
        self.position(variable).is_ok()
    }

    /// Number of bound variables
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.into_iter()
    }

    #[inline]
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.entries.iter().map(|(v, _)| v)
    }

    /// Returns a new binding with `variable` bound to `value`.
    ///
    /// Returns `None` if `variable` is already bound: bindings are only ever extended.
    pub fn extended(&self, variable: Variable, value: Term) -> Option<Self> {
        let i = self.position(&variable).err()?;
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend_from_slice(&self.entries[..i]);
        entries.push((variable, value));
        entries.extend_from_slice(&self.entries[i..]);
        Some(Self { entries })
    }

    /// Returns a copy of this binding where `variable` is bound to `value` whatever its previous value.
    pub(crate) fn with_overwritten(&self, variable: Variable, value: Term) -> Self {
        let mut entries = self.entries.clone();
        match self.position(&variable) {
            Ok(i) => entries[i].1 = value,
            Err(i) => entries.insert(i, (variable, value)),
        }
        Self { entries }
    }

    /// Union of two compatible bindings, `None` if they disagree on a shared variable
    pub fn merge(&self, other: &Self) -> Option<Self> {
        let mut entries = Vec::with_capacity(self.entries.len() + other.entries.len());
        let mut left = self.entries.iter().peekable();
        let mut right = other.entries.iter().peekable();
        loop {
            match (left.peek(), right.peek()) {
                (Some((lv, lt)), Some((rv, rt))) => match lv.as_str().cmp(rv.as_str()) {
                    std::cmp::Ordering::Less => entries.extend(left.next().cloned()),
                    std::cmp::Ordering::Greater => entries.extend(right.next().cloned()),
                    std::cmp::Ordering::Equal => {
                        if lt != rt {
                            return None;
                        }
                        entries.extend(left.next().cloned());
                        right.next();
                    }
                },
                (Some(_), None) => entries.extend(left.next().cloned()),
                (None, Some(_)) => entries.extend(right.next().cloned()),
                (None, None) => return Some(Self { entries }),
            }
        }
    }

    /// Both bindings agree on all the variables they share
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.entries
            .iter()
            .all(|(v, t)| other.get(v).is_none_or(|o| o == t))
    }

    /// The two bindings share no variable
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.entries.iter().all(|(v, _)| !other.contains(v))
    }

    /// Every variable of this binding is bound to the same value in `other`
    pub fn is_contained_in(&self, other: &Self) -> bool {
        self.entries
            .iter()
            .all(|(v, t)| other.get(v).is_some_and(|o| o == t))
    }

    /// Restriction of the binding to the given variables
    pub fn project(&self, variables: &[Variable]) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(v, _)| variables.contains(v))
                .cloned()
                .collect(),
        }
    }

    /// Removes the variables matching `predicate`
    pub fn without(&self, mut predicate: impl FnMut(&Variable) -> bool) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(v, _)| !predicate(v))
                .cloned()
                .collect(),
        }
    }

    /// Builds a [`QuerySolution`] using the given variable order
    pub fn to_solution(&self, variables: &Arc<[Variable]>) -> QuerySolution {
        let values: Vec<_> = variables.iter().map(|v| self.get(v).cloned()).collect();
        (Arc::clone(variables), values).into()
    }
}

impl FromIterator<(Variable, Term)> for Binding {
    fn from_iter<I: IntoIterator<Item = (Variable, Term)>>(iter: I) -> Self {
        let mut entries = Vec::<(Variable, Term)>::new();
        for (variable, value) in iter {
            match entries.binary_search_by(|(v, _)| v.as_str().cmp(variable.as_str())) {
                Ok(i) => entries[i].1 = value,
                Err(i) => entries.insert(i, (variable, value)),
            }
        }
        Self { entries }
    }
}

impl From<&QuerySolution> for Binding {
    fn from(solution: &QuerySolution) -> Self {
        solution
            .iter()
            .map(|(v, t)| (v.clone(), t.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Binding {
    type Item = (&'a Variable, &'a Term);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (Variable, Term)>,
        fn(&'a (Variable, Term)) -> (&'a Variable, &'a Term),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .iter()
            .map(entry_ref as fn(&'a (Variable, Term)) -> (&'a Variable, &'a Term))
    }
}

fn entry_ref((variable, value): &(Variable, Term)) -> (&Variable, &Term) {
    (variable, value)
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(v, t)| (v.as_str(), t)))
            .finish()
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, (v, t)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "({v} {t})")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::Literal;

    fn int(v: i64) -> Term {
        Literal::from(v).into()
    }

    #[test]
    fn construction_order_does_not_matter() {
        let x = Variable::new_unchecked("x");
        let y = Variable::new_unchecked("y");
        let a: Binding = [(x.clone(), int(1)), (y.clone(), int(2))].into_iter().collect();
        let b: Binding = [(y, int(2)), (x, int(1))].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn extended_refuses_rebinding() {
        let x = Variable::new_unchecked("x");
        let b = Binding::singleton(x.clone(), int(1));
        assert!(b.extended(x.clone(), int(2)).is_none());
        let c = b.extended(Variable::new_unchecked("a"), int(3)).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.get(&x), Some(&int(1)));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn merge_requires_compatibility() {
        let x = Variable::new_unchecked("x");
        let y = Variable::new_unchecked("y");
        let a: Binding = [(x.clone(), int(1)), (y.clone(), int(2))].into_iter().collect();
        let b: Binding = [(x.clone(), int(1)), (y, int(9))].into_iter().collect();
        assert!(!a.is_compatible(&b));
        assert!(a.merge(&b).is_none());
        let c = Binding::singleton(x, int(1));
        assert!(a.is_compatible(&c));
        assert_eq!(a.merge(&c), Some(a.clone()));
    }

    #[test]
    fn containment() -> Result<(), Box<dyn std::error::Error>> {
        let x = Variable::new("x")?;
        let y = Variable::new("y")?;
        let small = Binding::singleton(x.clone(), int(1));
        let big: Binding = [(x, int(1)), (y, int(2))].into_iter().collect();
        assert!(small.is_contained_in(&big));
        assert!(!big.is_contained_in(&small));
        assert!(Binding::new().is_contained_in(&small));
        Ok(())
    }
}
