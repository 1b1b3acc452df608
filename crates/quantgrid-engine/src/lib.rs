//! quantgrid-engine — the worker side: computation cache, function
//! repository, the calculation node that executes jobs, and the bounded
//! executor pool that feeds it.

pub mod cache;
pub mod executor;
pub mod function;
pub mod node;

pub use cache::{CacheError, CacheSource, CacheValue, ComputationCache};
pub use executor::JobOutcome;
pub use function::{CalcFunction, FunctionContext, FunctionError, FunctionInputs, FunctionRepository};
pub use node::{CalculationNode, JobError};
