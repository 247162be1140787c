//! AGENDA Ops - Validation, Tool Schemas and Operation Processing
//!
//! Everything between a model's loose JSON and a committed change:
//! - `validator`: draft to typed `Operation`, with stable error codes
//! - `schema`: one JSON Schema and example per operation tag
//! - `dedupe`: drop repeated operations within a batch
//! - `executor` / `processor`: apply a batch transactionally with audit rows

pub mod dedupe;
pub mod executor;
pub mod processor;
pub mod schema;
pub mod validator;

pub use dedupe::{dedupe, DedupeKey};
pub use executor::{Effect, ExecOutcome, OperationExecutor, StoreExecutor};
pub use processor::{
    BatchEntry, BatchRecorder, InMemoryBatchRecorder, OpResult, OperationProcessor,
    OperationRegistry, ProcessResult, ProcessSummary, ToolDoc,
};
pub use schema::{check_against_schema, example_for, schema_for};
pub use validator::{
    validate_all, validate_draft, ValidationContext, ValidationReport, ValidationResult, Verdict,
    MAX_TITLE_CHARS,
};
