//! Histogram-based leaf-wise decision tree learner for gradient
//! boosting.
//!
//! Given a pre-binned [`data::Dataset`] and per-row gradient/hessian
//! vectors, [`learner::TreeLearner`] grows one decision tree per call by
//! best-first leaf-wise splitting: each iteration searches every feature
//! histogram for the split with the highest regularised gain, splits the
//! winning leaf, and reuses the parent's cached histogram to derive the
//! larger child by subtraction.
//!
//! ```no_run
//! use leafwise::data::{DatasetBuilder, MissingType};
//! use leafwise::{Config, TreeLearner};
//!
//! let mut builder = DatasetBuilder::new(255);
//! builder.push_numerical(&[0.0, 1.0, 2.0, 3.0], MissingType::None);
//! let dataset = builder.build().unwrap();
//!
//! let config = Config { num_leaves: 31, ..Default::default() };
//! let mut learner = TreeLearner::new(config, &dataset, true).unwrap();
//! let gradients = vec![0.5f32, -0.5, 0.5, -0.5];
//! let hessians = vec![1.0f32; 4];
//! let tree = learner.train(&dataset, &gradients, &hessians, true, None);
//! ```

pub mod bitset;
pub mod config;
pub mod data;
pub mod error;
pub mod learner;
pub mod partition;
pub mod tree;

pub use config::Config;
pub use error::{Error, Result};
pub use learner::{Objective, SplitInfo, SplitPenalty, TreeLearner};
pub use tree::Tree;
