//! Motion-score and animal-classifier stages.
//!
//! Both stages are collaborators of the filter pipeline. This module fixes
//! their contracts and ships stub backends for wiring and tests.

mod backend;
mod backends;
mod result;

pub use backend::{AnimalClassifier, MotionScorer};
pub use backends::{StubClassifier, StubScorer};
pub use result::Classification;
