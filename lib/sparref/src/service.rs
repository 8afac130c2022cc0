use crate::algebra::Op;
use crate::error::QueryEvaluationError;
use crate::model::QuerySolutionIter;
use oxrdf::NamedNode;
use rustc_hash::FxHashMap;
use std::error::Error;
use std::sync::Arc;

/// Handler for [SPARQL 1.1 Federated Query](https://www.w3.org/TR/sparql11-federated-query/) SERVICEs.
///
/// Registered with [`EvaluationOptions::with_service_handler`](crate::EvaluationOptions::with_service_handler)
/// for a given service IRI, or with
/// [`EvaluationOptions::with_default_service_handler`](crate::EvaluationOptions::with_default_service_handler)
/// for the services without a dedicated handler.
///
/// ```
/// use oxrdf::{Dataset, NamedNode, Variable};
/// use sparesults::QuerySolution;
/// use sparref::algebra::Op;
/// use sparref::{EvaluationOptions, QueryEngineRef, QueryResults, QuerySolutionIter, ServiceHandler};
/// use spargebra::Query;
/// use std::convert::Infallible;
/// use std::iter::once;
/// use std::sync::Arc;
///
/// struct EchoService;
///
/// impl ServiceHandler for EchoService {
///     type Error = Infallible;
///
///     fn handle(
///         &self,
///         service_name: &NamedNode,
///         _pattern: &Op,
///     ) -> Result<QuerySolutionIter<'static>, Self::Error> {
///         // Always return a single binding foo -> name of service
///         let variables = [Variable::new_unchecked("foo")].into();
///         Ok(QuerySolutionIter::new(
///             Arc::clone(&variables),
///             once(Ok(QuerySolution::from((
///                 variables,
///                 vec![Some(service_name.clone().into())],
///             )))),
///         ))
///     }
/// }
///
/// let options = EvaluationOptions::default().with_default_service_handler(EchoService);
/// let query = Query::parse(
///     "SELECT ?foo WHERE { SERVICE <http://example.com/service> {} }",
///     None,
/// )?;
/// if let QueryResults::Solutions(mut solutions) =
///     QueryEngineRef::new(options).execute(&query, &Dataset::new())?
/// {
///     assert_eq!(
///         solutions.next().unwrap()?.get("foo"),
///         Some(&NamedNode::new("http://example.com/service")?.into())
///     );
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait ServiceHandler: Send + Sync {
    /// The service evaluation error.
    type Error: Error + Send + Sync + 'static;

    /// Evaluates the `SERVICE` inner pattern against the service named `service_name`.
    fn handle(
        &self,
        service_name: &NamedNode,
        pattern: &Op,
    ) -> Result<QuerySolutionIter<'static>, Self::Error>;
}

type HandlerFn = Arc<
    dyn Fn(&NamedNode, &Op) -> Result<QuerySolutionIter<'static>, QueryEvaluationError>
        + Send
        + Sync,
>;

/// The handlers by service name, with an optional fallback
#[derive(Clone, Default)]
pub(crate) struct ServiceHandlerRegistry {
    handlers: FxHashMap<NamedNode, HandlerFn>,
    fallback: Option<HandlerFn>,
}

impl ServiceHandlerRegistry {
    /// Registers `handler` for `service_name`, or as the fallback if `None`
    pub(crate) fn with_handler(
        mut self,
        service_name: Option<NamedNode>,
        handler: impl ServiceHandler + 'static,
    ) -> Self {
        let handler: HandlerFn = Arc::new(move |name: &NamedNode, pattern: &Op| {
            handler.handle(name, pattern).map_err(wrap_service_error)
        });
        match service_name {
            Some(name) => {
                self.handlers.insert(name, handler);
            }
            None => self.fallback = Some(handler),
        }
        self
    }

    pub(crate) fn handle(
        &self,
        service_name: &NamedNode,
        pattern: &Op,
    ) -> Result<QuerySolutionIter<'static>, QueryEvaluationError> {
        let handler = self
            .handlers
            .get(service_name)
            .or(self.fallback.as_ref())
            .ok_or_else(|| QueryEvaluationError::UnsupportedService(service_name.clone()))?;
        handler(service_name, pattern)
    }
}

/// Keeps [`QueryEvaluationError`]s as they are, boxes the other errors
fn wrap_service_error(error: impl Error + Send + Sync + 'static) -> QueryEvaluationError {
    let error: Box<dyn Error + Send + Sync> = Box::new(error);
    match error.downcast() {
        Ok(error) => *error,
        Err(error) => QueryEvaluationError::Service(error),
    }
}
