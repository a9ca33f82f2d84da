pub mod protocol;
pub mod sqs;

// Re-export the batch handler so the Lambda binary can wire it directly.
pub use protocol::{BatchItemFailure, MalformedMessage, SqsBatchResponse, SqsEvent, SqsMessage};
pub use sqs::handle_sqs_batch;
