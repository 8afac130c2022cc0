//! Property functions ("magic predicates"): triple patterns whose predicate is computed instead of matched.
//!
//! A basic graph pattern triple whose predicate is a registered property function is evaluated by calling
//! the function with its subject and object. Either side may be an RDF list written with the `( ... )` syntax,
//! in which case the function receives all the list elements.

use crate::algebra::PropFuncArg;
use crate::binding::Binding;
use crate::context::ExecutionContext;
use crate::error::QueryEvaluationError;
use crate::expression::compile_pattern;
use crate::substitute::substitute_arg;
use oxrdf::vocab::rdf;
use oxrdf::{Literal, NamedNode, NamedNodeRef, Term};
use rustc_hash::{FxHashMap, FxHashSet};
use spargebra::term::TermPattern;
use std::error::Error;
use std::sync::Arc;

/// `list:member`: `?list list:member ?member`
pub const LIST_MEMBER: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://jena.apache.org/ARQ/list#member");
/// `list:length`: `?list list:length ?length`
pub const LIST_LENGTH: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://jena.apache.org/ARQ/list#length");
/// `list:index`: `?list list:index (?index ?member)`, indexes start at 0
pub const LIST_INDEX: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://jena.apache.org/ARQ/list#index");
/// `apf:strSplit`: `?part apf:strSplit (?string ?regex)`
pub const STR_SPLIT: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://jena.apache.org/ARQ/property#strSplit");

/// A property function.
///
/// The arguments are given with the current solution already substituted:
/// the variables left in them are unbound and the function is expected to bind them.
/// Each returned binding is merged with the current solution. Returning no binding filters the solution out.
///
/// ```
/// use oxrdf::{Dataset, Literal, NamedNode};
/// use sparref::algebra::PropFuncArg;
/// use sparref::{
///     Binding, EvaluationOptions, ExecutionContext, PropertyFunction, QueryEngineRef,
///     QueryResults,
/// };
/// use spargebra::Query;
/// use spargebra::term::TermPattern;
/// use std::error::Error;
///
/// /// `?n ex:upTo 3` binds ?n to 1, 2 and 3
/// struct UpTo;
///
/// impl PropertyFunction for UpTo {
///     fn execute(
///         &self,
///         subject: &PropFuncArg,
///         object: &PropFuncArg,
///         _context: &ExecutionContext<'_>,
///     ) -> Result<Vec<Binding>, Box<dyn Error + Send + Sync>> {
///         let (Some(TermPattern::Variable(n)), Some(TermPattern::Literal(max))) =
///             (subject.as_node(), object.as_node())
///         else {
///             return Err("ex:upTo expects a variable and a number".into());
///         };
///         let max = max.value().parse::<i64>()?;
///         Ok((1..=max)
///             .map(|i| Binding::singleton(n.clone(), Literal::from(i).into()))
///             .collect())
///     }
/// }
///
/// let options = EvaluationOptions::default()
///     .with_property_function(NamedNode::new("http://example.com/upTo")?, UpTo);
/// let query = Query::parse("SELECT ?n WHERE { ?n <http://example.com/upTo> 3 }", None)?;
/// if let QueryResults::Solutions(solutions) =
///     QueryEngineRef::new(options).execute(&query, &Dataset::new())?
/// {
///     assert_eq!(solutions.count(), 3);
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait PropertyFunction: Send + Sync {
    /// Validates the shape of the arguments before any solution is processed.
    fn build(
        &self,
        subject: &PropFuncArg,
        object: &PropFuncArg,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let _ = (subject, object);
        Ok(())
    }

    /// Evaluates the function for a single solution
    fn execute(
        &self,
        subject: &PropFuncArg,
        object: &PropFuncArg,
        context: &ExecutionContext<'_>,
    ) -> Result<Vec<Binding>, Box<dyn Error + Send + Sync>>;
}

/// The property functions known to the evaluator, by predicate IRI
#[derive(Clone, Default)]
pub struct PropertyFunctionRegistry {
    functions: FxHashMap<NamedNode, Arc<dyn PropertyFunction>>,
}

impl PropertyFunctionRegistry {
    /// A registry with `list:member`, `list:length`, `list:index` and `apf:strSplit`
    pub fn with_standard_functions() -> Self {
        let mut registry = Self::default();
        registry.register(LIST_MEMBER.into_owned(), ListMember);
        registry.register(LIST_LENGTH.into_owned(), ListLength);
        registry.register(LIST_INDEX.into_owned(), ListIndex);
        registry.register(STR_SPLIT.into_owned(), StrSplit);
        registry
    }

    pub fn register(&mut self, name: NamedNode, function: impl PropertyFunction + 'static) {
        self.functions.insert(name, Arc::new(function));
    }

    pub fn get(&self, name: &NamedNode) -> Option<&dyn PropertyFunction> {
        Some(&**self.functions.get(name)?)
    }

    pub fn contains(&self, name: &NamedNode) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &NamedNode> {
        self.functions.keys()
    }
}

/// Calls the property function `name` for one solution.
///
/// `row` is substituted into the arguments and each binding returned by the function is merged with it.
pub(crate) fn call_property_function(
    name: &NamedNode,
    subject: &PropFuncArg,
    object: &PropFuncArg,
    row: &Binding,
    context: &ExecutionContext<'_>,
) -> Result<Vec<Binding>, QueryEvaluationError> {
    let function = context
        .options()
        .property_functions()
        .get(name)
        .ok_or_else(|| QueryEvaluationError::UnknownPropertyFunction(name.clone()))?;
    let subject = substitute_arg(subject, row);
    let object = substitute_arg(object, row);
    Ok(function
        .execute(&subject, &object, context)
        .map_err(QueryEvaluationError::PropertyFunction)?
        .into_iter()
        .filter_map(|binding| binding.merge(row))
        .collect())
}

#[derive(Debug, thiserror::Error)]
enum ArgumentError {
    #[error("{function} expects a single node as {position}")]
    ExpectedNode {
        function: NamedNodeRef<'static>,
        position: &'static str,
    },
    #[error("{function} expects a list of {size} elements as object")]
    ExpectedList {
        function: NamedNodeRef<'static>,
        size: usize,
    },
}

/// The value of a constant argument, `None` for an unbound variable
fn constant(pattern: &TermPattern) -> Option<Term> {
    match pattern {
        TermPattern::NamedNode(t) => Some(t.clone().into()),
        TermPattern::BlankNode(t) => Some(t.clone().into()),
        TermPattern::Literal(t) => Some(t.clone().into()),
        TermPattern::Variable(_) => None,
    }
}

/// Binds `pattern` to `value` if it is a variable, checks equality otherwise
fn unify(pattern: &TermPattern, value: Term) -> Option<Binding> {
    match pattern {
        TermPattern::Variable(v) => Some(Binding::singleton(v.clone(), value)),
        _ => (constant(pattern)? == value).then(Binding::new),
    }
}

fn single_node<'a>(
    arg: &'a PropFuncArg,
    function: NamedNodeRef<'static>,
    position: &'static str,
) -> Result<&'a TermPattern, ArgumentError> {
    arg.as_node()
        .ok_or(ArgumentError::ExpectedNode { function, position })
}

/// Elements of the RDF list starting at `head` in the active graph.
///
/// Returns `None` if `head` is not a well-formed list.
fn list_members(
    head: &Term,
    context: &ExecutionContext<'_>,
) -> Result<Option<Vec<Term>>, Box<dyn Error + Send + Sync>> {
    let first = Term::from(rdf::FIRST.into_owned());
    let rest = Term::from(rdf::REST.into_owned());
    let nil = Term::from(rdf::NIL.into_owned());
    let mut members = Vec::new();
    let mut visited = FxHashSet::default();
    let mut current = head.clone();
    while current != nil {
        if !visited.insert(current.clone()) {
            return Ok(None); // cycle
        }
        let Some((_, _, value)) = context
            .triples_for_pattern(Some(&current), Some(&first), None)?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let Some((_, _, next)) = context
            .triples_for_pattern(Some(&current), Some(&rest), None)?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        members.push(value);
        current = next;
    }
    Ok(Some(members))
}

/// Candidate lists for an argument: a list written in the pattern, the list starting at the bound node
/// or all the list heads of the active graph
fn lists(
    subject: &PropFuncArg,
    context: &ExecutionContext<'_>,
) -> Result<Vec<(Binding, Vec<Term>)>, Box<dyn Error + Send + Sync>> {
    let subject = match subject {
        PropFuncArg::List(elements) => {
            return Ok(elements
                .iter()
                .map(constant)
                .collect::<Option<Vec<_>>>()
                .map(|members| (Binding::new(), members))
                .into_iter()
                .collect());
        }
        PropFuncArg::Node(subject) => subject,
    };
    if let Some(head) = constant(subject) {
        return Ok(list_members(&head, context)?
            .map(|members| (Binding::new(), members))
            .into_iter()
            .collect());
    }
    let first = Term::from(rdf::FIRST.into_owned());
    let rest = Term::from(rdf::REST.into_owned());
    let mut seen = FxHashSet::default();
    let mut result = Vec::new();
    for (head, _, _) in context.triples_for_pattern(None, Some(&first), None)? {
        if !seen.insert(head.clone())
            || !context
                .triples_for_pattern(None, Some(&rest), Some(&head))?
                .is_empty()
        {
            continue;
        }
        if let Some(members) = list_members(&head, context)? {
            if let Some(binding) = unify(subject, head) {
                result.push((binding, members));
            }
        }
    }
    Ok(result)
}

struct ListMember;

impl PropertyFunction for ListMember {
    fn build(
        &self,
        _subject: &PropFuncArg,
        object: &PropFuncArg,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        single_node(object, LIST_MEMBER, "object")?;
        Ok(())
    }

    fn execute(
        &self,
        subject: &PropFuncArg,
        object: &PropFuncArg,
        context: &ExecutionContext<'_>,
    ) -> Result<Vec<Binding>, Box<dyn Error + Send + Sync>> {
        let object = single_node(object, LIST_MEMBER, "object")?;
        let mut result = Vec::new();
        for (list_binding, members) in lists(subject, context)? {
            for member in members {
                if let Some(binding) = unify(object, member).and_then(|b| b.merge(&list_binding))
                {
                    result.push(binding);
                }
            }
        }
        Ok(result)
    }
}

struct ListLength;

impl PropertyFunction for ListLength {
    fn build(
        &self,
        _subject: &PropFuncArg,
        object: &PropFuncArg,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        single_node(object, LIST_LENGTH, "object")?;
        Ok(())
    }

    fn execute(
        &self,
        subject: &PropFuncArg,
        object: &PropFuncArg,
        context: &ExecutionContext<'_>,
    ) -> Result<Vec<Binding>, Box<dyn Error + Send + Sync>> {
        let object = single_node(object, LIST_LENGTH, "object")?;
        let mut result = Vec::new();
        for (list_binding, members) in lists(subject, context)? {
            let length = Literal::from(i64::try_from(members.len())?);
            if let Some(binding) = unify(object, length.into()).and_then(|b| b.merge(&list_binding))
            {
                result.push(binding);
            }
        }
        Ok(result)
    }
}

struct ListIndex;

impl PropertyFunction for ListIndex {
    fn build(
        &self,
        _subject: &PropFuncArg,
        object: &PropFuncArg,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if !matches!(object, PropFuncArg::List(l) if l.len() == 2) {
            return Err(ArgumentError::ExpectedList {
                function: LIST_INDEX,
                size: 2,
            }
            .into());
        }
        Ok(())
    }

    fn execute(
        &self,
        subject: &PropFuncArg,
        object: &PropFuncArg,
        context: &ExecutionContext<'_>,
    ) -> Result<Vec<Binding>, Box<dyn Error + Send + Sync>> {
        let [index, member] = object.nodes() else {
            return Err(ArgumentError::ExpectedList {
                function: LIST_INDEX,
                size: 2,
            }
            .into());
        };
        let mut result = Vec::new();
        for (list_binding, members) in lists(subject, context)? {
            for (i, value) in members.into_iter().enumerate() {
                let position = Literal::from(i64::try_from(i)?);
                if let Some(binding) = unify(index, position.into())
                    .and_then(|b| b.merge(&unify(member, value)?))
                    .and_then(|b| b.merge(&list_binding))
                {
                    result.push(binding);
                }
            }
        }
        Ok(result)
    }
}

struct StrSplit;

impl PropertyFunction for StrSplit {
    fn build(
        &self,
        subject: &PropFuncArg,
        object: &PropFuncArg,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        single_node(subject, STR_SPLIT, "subject")?;
        if !matches!(object, PropFuncArg::List(l) if l.len() == 2) {
            return Err(ArgumentError::ExpectedList {
                function: STR_SPLIT,
                size: 2,
            }
            .into());
        }
        Ok(())
    }

    fn execute(
        &self,
        subject: &PropFuncArg,
        object: &PropFuncArg,
        _context: &ExecutionContext<'_>,
    ) -> Result<Vec<Binding>, Box<dyn Error + Send + Sync>> {
        let subject = single_node(subject, STR_SPLIT, "subject")?;
        let [TermPattern::Literal(text), TermPattern::Literal(pattern)] = object.nodes() else {
            // unbound or non literal arguments: no solution
            return Ok(Vec::new());
        };
        let Some(regex) = compile_pattern(pattern.value(), None) else {
            return Ok(Vec::new());
        };
        Ok(regex
            .split(text.value())
            .filter_map(|part| unify(subject, Literal::from(part).into()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EvaluationOptions;
    use oxrdf::{BlankNode, Dataset, GraphName, Quad, Variable};

    fn list_dataset() -> (Dataset, BlankNode) {
        let head = BlankNode::new_unchecked("l1");
        let second = BlankNode::new_unchecked("l2");
        let mut dataset = Dataset::new();
        dataset.insert(&Quad::new(
            head.clone(),
            rdf::FIRST,
            Literal::from("a"),
            GraphName::DefaultGraph,
        ));
        dataset.insert(&Quad::new(
            head.clone(),
            rdf::REST,
            second.clone(),
            GraphName::DefaultGraph,
        ));
        dataset.insert(&Quad::new(
            second.clone(),
            rdf::FIRST,
            Literal::from("b"),
            GraphName::DefaultGraph,
        ));
        dataset.insert(&Quad::new(
            second,
            rdf::REST,
            rdf::NIL.into_owned(),
            GraphName::DefaultGraph,
        ));
        (dataset, head)
    }

    fn var(name: &str) -> PropFuncArg {
        PropFuncArg::Node(Variable::new_unchecked(name).into())
    }

    #[test]
    fn list_member_enumerates_members() {
        let (dataset, head) = list_dataset();
        let context = ExecutionContext::new(&dataset, EvaluationOptions::default());
        let result = ListMember
            .execute(&PropFuncArg::Node(head.into()), &var("m"), &context)
            .unwrap();
        assert_eq!(
            result,
            vec![
                Binding::singleton(Variable::new_unchecked("m"), Literal::from("a").into()),
                Binding::singleton(Variable::new_unchecked("m"), Literal::from("b").into()),
            ]
        );
    }

    #[test]
    fn unbound_list_finds_heads_only() {
        let (dataset, head) = list_dataset();
        let context = ExecutionContext::new(&dataset, EvaluationOptions::default());
        let result = ListLength.execute(&var("l"), &var("n"), &context).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(
            result[0].get(&Variable::new_unchecked("l")),
            Some(&head.into())
        );
        assert_eq!(
            result[0].get(&Variable::new_unchecked("n")),
            Some(&Literal::from(2).into())
        );
    }

    #[test]
    fn list_index_is_zero_based() {
        let (dataset, head) = list_dataset();
        let context = ExecutionContext::new(&dataset, EvaluationOptions::default());
        let object = PropFuncArg::List(vec![
            Literal::from(1).into(),
            Variable::new_unchecked("m").into(),
        ]);
        let result = ListIndex
            .execute(&PropFuncArg::Node(head.into()), &object, &context)
            .unwrap();
        assert_eq!(
            result,
            vec![Binding::singleton(
                Variable::new_unchecked("m"),
                Literal::from("b").into()
            )]
        );
        assert!(
            ListIndex
                .build(&var("l"), &PropFuncArg::Node(Literal::from(1).into()))
                .is_err()
        );
    }

    #[test]
    fn str_split() {
        let dataset = Dataset::new();
        let context = ExecutionContext::new(&dataset, EvaluationOptions::default());
        let object = PropFuncArg::List(vec![
            Literal::from("a,b,c").into(),
            Literal::from(",").into(),
        ]);
        assert_eq!(StrSplit.execute(&var("p"), &object, &context).unwrap().len(), 3);
    }

    #[test]
    fn standard_registry() {
        let registry = PropertyFunctionRegistry::with_standard_functions();
        assert!(registry.contains(&LIST_MEMBER.into_owned()));
        assert!(registry.get(&STR_SPLIT.into_owned()).is_some());
        assert_eq!(registry.names().count(), 4);
        assert!(
            !PropertyFunctionRegistry::default().contains(&LIST_INDEX.into_owned())
        );
    }
}
