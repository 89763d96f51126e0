//! Search core: the PREPARE -> EXECUTE pipeline.
//!
//! PREPARE (lane, canonicalization, variants, intent, bias, column matching,
//! batching) is pure; EXECUTE (probes, waves, merge, rank) is the only part
//! that touches the database collaborator.

pub mod bias;
pub mod canonical;
pub mod capability;
pub mod executor;
pub mod intent;
pub mod lane;
pub mod operators;
pub mod orchestrator;
pub mod planner;
pub mod ranker;
pub mod scope;
pub mod sqlgen;
pub mod surface;
pub mod variants;

pub use capability::{CapabilityRegistry, EntityType, Strength};
pub use intent::Intent;
pub use lane::{Lane, LaneDecision};
pub use operators::{Operator, ParamValue, Wave};
pub use orchestrator::SearchService;
pub use planner::{ExecutionPlan, ExpandedTerm};
pub use scope::{UserRole, UserScope};
pub use sqlgen::Probe;
pub use surface::SurfaceState;
