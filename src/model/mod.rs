pub mod composite;
pub mod duration;
pub mod fundamentals;
pub mod metrics;
pub mod prediction;

pub use composite::{CompositeModel, DurationPredictor, TrainingParameters};
pub use duration::TargetDuration;
pub use fundamentals::{
    Dataset, FundamentalsBounds, FundamentalsSnapshot, RatioRange, RawFundamentals,
    TrainingExample, FEATURE_COUNT, FEATURE_NAMES,
};
pub use metrics::{CrossValidationAgreement, RegressionQualityMetrics};
pub use prediction::{PointOutcome, PricePointPrediction, PriceTrendPrediction};
