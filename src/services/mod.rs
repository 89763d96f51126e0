pub mod database;
pub mod embedding;
pub mod linking;
pub mod search;

pub use database::{DbError, PgSearchDatabase, SearchDatabase};
pub use embedding::{EmbeddingClient, HttpEmbeddingClient, NullEmbeddingClient};
pub use linking::{CandidateFinder, LinkingLadder, VendorAffinityCache};
pub use search::SearchService;
