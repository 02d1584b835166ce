//! Stacked regression ensembles
//!
//! The flow of a run:
//! 1. One [`FoldAssignment`](crate::training::FoldAssignment) is drawn and
//!    shared by every candidate.
//! 2. The linear family ([`linear_family::tune`]) and the boosted-tree family
//!    ([`tree_family::evaluate`]) produce out-of-fold prediction columns.
//! 3. [`assemble`] joins the columns with the target into a [`StackMatrix`].
//! 4. [`blend`] fits a penalized meta-learner and marks retained members.
//! 5. [`finalize`] refits the retained candidates on all rows.
//! 6. [`Ensemble`] combines them for new data.
//!
//! [`StackBuilder`] drives the whole sequence from a
//! [`StackConfig`](crate::config::StackConfig).

pub mod assembler;
pub mod blender;
pub mod candidate;
pub mod ensemble;
pub mod finalizer;
pub mod linear_family;
pub mod oof;
pub mod pipeline;
pub mod tree_family;

pub use assembler::{assemble, StackMatrix};
pub use blender::{blend, one_standard_error, BlendMember, BlendModel, BlendPath, BlendSettings};
pub use candidate::{CandidateFamily, CandidateId, CandidateParams, CandidateSpec, FitOptions, FittedCandidate};
pub use ensemble::{Ensemble, PredictionTable};
pub use finalizer::{finalize, FinalizedModel, FinalizedModels};
pub use linear_family::{default_grid, regular_grid, LinearGridPoint, TuneResult};
pub use oof::{cross_predict, out_of_fold, OutOfFoldColumn};
pub use pipeline::{StackBuilder, StackedRun};
