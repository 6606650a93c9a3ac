/// Result of classifying one image.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Classification {
    /// Did the classifier find an animal?
    pub is_animal: bool,
    /// Confidence of that decision, 0..=1.
    pub confidence: f32,
}

impl Classification {
    /// Classify by comparing `confidence` against `threshold`.
    pub fn from_confidence(confidence: f32, threshold: f32) -> Self {
        Self {
            is_animal: confidence >= threshold,
            confidence,
        }
    }
}
