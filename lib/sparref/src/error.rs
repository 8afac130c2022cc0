use oxrdf::{NamedNode, Term, Variable};
use std::convert::Infallible;
use std::error::Error;

/// An error raised while evaluating a SPARQL algebra expression
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryEvaluationError {
    /// Error from the underlying RDF dataset
    #[error(transparent)]
    Dataset(Box<dyn Error + Send + Sync>),
    /// Error during `SERVICE` evaluation
    #[error("{0}")]
    Service(#[source] Box<dyn Error + Send + Sync>),
    /// The variable storing the `SERVICE` name is unbound
    #[error("The variable encoding the service name is unbound")]
    UnboundService,
    /// Invalid service name
    #[error("{0} is not a valid service name")]
    InvalidServiceName(Term),
    /// The given `SERVICE` is not supported
    #[error("The service {0} is not supported")]
    UnsupportedService(NamedNode),
    /// The algebra node is not supported by the reference evaluator
    #[error("The algebra operation {0} is not supported by the reference evaluator")]
    UnsupportedOperation(String),
    /// `BIND` or `extend` targets a variable that is already bound
    #[error("The variable {0} is already bound and can not be extended")]
    VariableRebinding(Variable),
    /// `assign` targets a variable that is already bound to a different value
    #[error("The variable {variable} is already bound to {existing} and can not be assigned {new}")]
    AssignConflict {
        variable: Variable,
        existing: Term,
        new: Term,
    },
    /// No property function is registered with this name
    #[error("The property function {0} is not registered")]
    UnknownPropertyFunction(NamedNode),
    /// Error returned by a property function
    #[error("{0}")]
    PropertyFunction(#[source] Box<dyn Error + Send + Sync>),
    /// No procedure is registered with this name
    #[error("The procedure {0} is not registered")]
    UnknownProcedure(NamedNode),
    /// Error returned by a procedure
    #[error("{0}")]
    Procedure(#[source] Box<dyn Error + Send + Sync>),
    /// A solution binds a variable the result does not declare
    #[error("The solution binds the variable {0} that is not part of the result variables")]
    UnexpectedVariable(Variable),
    #[doc(hidden)]
    #[error(transparent)]
    Unexpected(Box<dyn Error + Send + Sync>),
}

impl From<Infallible> for QueryEvaluationError {
    #[inline]
    fn from(error: Infallible) -> Self {
        match error {}
    }
}
