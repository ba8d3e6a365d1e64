pub mod db;
pub mod fetch;
pub mod generation;
pub mod search;

pub use db::DbAdapter;
pub use fetch::GuardedFetcher;
pub use generation::OpenAiGenerationAdapter;
pub use search::SearchGenerationAdapter;
