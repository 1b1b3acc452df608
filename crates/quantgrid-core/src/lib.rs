//! quantgrid-core — job/result data model, execution-log capture, the
//! identifier directory, and the wire-boundary conversions.
//! The engine crate depends on this one.

pub mod config;
pub mod execlog;
pub mod ident;
pub mod job;
pub mod result;
pub mod value;
pub mod wire;

pub use execlog::{ExecutionLog, ExecutionLogMode, LogEvent, LogLevel, MutableExecutionLog};
pub use job::{CacheSelectHint, CalculationJob, CalculationJobItem, CalculationJobSpecification};
pub use result::{CalculationJobResult, CalculationJobResultItem, InvocationResult};
pub use value::{ComputedValue, MissingOutput, TargetSpecification, ValueSpecification};
