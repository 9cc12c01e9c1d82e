pub mod agreement;
pub mod kfold;

pub use agreement::{
    agreement_from_predictions, CrossValidationAnalyzer, FoldResult, DEFAULT_FOLDS,
};
pub use kfold::{k_fold, train_test_indices, FoldSplit};
