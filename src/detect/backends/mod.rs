pub mod stub;

pub use stub::{StubClassifier, StubScorer};
