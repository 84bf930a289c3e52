//! Token estimation and on-disk paths shared by every condense stage

mod io;
mod paths;
mod tokens;

pub use io::atomic_write;
pub use paths::{Paths, HOME_ENV};
pub use tokens::{
    estimate_tokens, estimator_for, is_cjk, HeuristicEstimator, SubwordEstimator,
    SubwordTokenizer, TokenEstimator,
};
