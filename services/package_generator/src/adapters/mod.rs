pub mod db;
pub mod generation_llm;
pub mod notifier;

pub use db::DbAdapter;
pub use generation_llm::{GenerationSettings, OpenAiPackageAdapter};
pub use notifier::{PackageGeneratedEvent, SnsCompletionNotifier};
