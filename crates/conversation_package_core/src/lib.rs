pub mod domain;
pub mod normalize;
pub mod pipeline;
pub mod ports;

pub use domain::{
    normalize_language, AnalysisRecord, AnalysisResult, Conversation, Feedback, GeneratedPackage,
    Notes, Package, SessionCompletionEvent, Target, UserContext, WordUsage,
};
pub use normalize::{normalize_generated_package, parse_generated_package, MIN_TARGETS_PER_CONVERSATION};
pub use pipeline::{GenerationPipeline, PipelinePorts, PipelineSettings, ProcessOutcome, SkipReason};
pub use ports::{
    AnalysisHistoryReader, Clock, CompletionNotifier, GenerationRequest, GenerationStateTracker,
    PackageGenerationService, PackageStore, PortError, PortResult, SystemClock, UserContextReader,
};
