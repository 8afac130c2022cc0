use crate::binding::Binding;
use crate::context::ExecutionContext;
use oxrdf::{NamedNode, Term};
use rustc_hash::FxHashMap;
use std::error::Error;
use std::sync::Arc;

/// A procedure called by the `procedure` algebra operator.
///
/// The procedure is called once per input solution with its evaluated arguments
/// (`None` for an argument whose evaluation failed).
/// Each returned binding is merged with the input solution, incompatible ones are dropped.
///
/// ```
/// use oxrdf::{Literal, NamedNode, Term, Variable};
/// use sparref::{Binding, EvaluationOptions, ExecutionContext, Procedure};
/// use std::error::Error;
///
/// /// Binds ?len to the number of arguments
/// struct ArgCount;
///
/// impl Procedure for ArgCount {
///     fn execute(
///         &self,
///         args: &[Option<Term>],
///         _context: &ExecutionContext<'_>,
///     ) -> Result<Vec<Binding>, Box<dyn Error + Send + Sync>> {
///         Ok(vec![Binding::singleton(
///             Variable::new("len")?,
///             Literal::from(i64::try_from(args.len())?).into(),
///         )])
///     }
/// }
///
/// let options = EvaluationOptions::default()
///     .with_procedure(NamedNode::new("http://example.com/argCount")?, ArgCount);
/// assert!(
///     options
///         .procedures()
///         .contains(&NamedNode::new("http://example.com/argCount")?)
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait Procedure: Send + Sync {
    fn execute(
        &self,
        args: &[Option<Term>],
        context: &ExecutionContext<'_>,
    ) -> Result<Vec<Binding>, Box<dyn Error + Send + Sync>>;
}

/// The procedures known to the evaluator, by IRI
#[derive(Clone, Default)]
pub struct ProcedureRegistry {
    procedures: FxHashMap<NamedNode, Arc<dyn Procedure>>,
}

impl ProcedureRegistry {
    pub fn register(&mut self, name: NamedNode, procedure: impl Procedure + 'static) {
        self.procedures.insert(name, Arc::new(procedure));
    }

    pub fn get(&self, name: &NamedNode) -> Option<&dyn Procedure> {
        Some(&**self.procedures.get(name)?)
    }

    pub fn contains(&self, name: &NamedNode) -> bool {
        self.procedures.contains_key(name)
    }
}
