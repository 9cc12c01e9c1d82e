pub mod composite;
pub mod search;
pub mod session;

pub use composite::{CompositeTrainer, TrainedComposite};
pub use search::{automated_search, candidate_grid, SearchOutcome, SearchTrial};
pub use session::{RegressionTrainingSession, SessionState};
