//! Email linking: token extraction, hybrid fusion, and the linking ladder.

pub mod affinity;
pub mod candidates;
pub mod fusion;
pub mod ladder;
pub mod score;
pub mod token_extractor;

pub use affinity::VendorAffinityCache;
pub use candidates::CandidateFinder;
pub use fusion::FusionInputs;
pub use ladder::{LadderAction, LadderLevel, LadderOutcome, LinkingLadder};
pub use score::{LinkCandidate, MatchReason, ScoringEngine};
pub use token_extractor::{ExtractedTokens, TokenExtractor};
