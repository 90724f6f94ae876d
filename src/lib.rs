//! Kolosal Classifier - uniform facade over a catalog of classifiers
//!
//! Pick a classifier family by name, configure it, then fit, predict, score,
//! evaluate and grid-search tune it through one [`ModelFacade`].
//!
//! # Modules
//!
//! - [`facade`] - The [`ModelFacade`] entry point and tuning reports
//! - [`registry`] - Static name to constructor catalog
//! - [`params`] - Typed configurations and tuning grids
//! - [`estimators`] - The [`Classifier`](estimators::Classifier) contract and the eleven families
//! - [`search`] - Cross-validated grid search behind [`SearchCapability`](search::SearchCapability)
//! - [`metrics`] - Scoring metrics and confusion counting
//! - [`config`] - Tuning configuration
//!
//! # Example
//!
//! ```
//! use kolosal_classifier::prelude::*;
//! use ndarray::array;
//!
//! let x = array![[0.0, 0.0], [1.0, 1.0]];
//! let y = array![0.0, 1.0];
//!
//! let mut facade = ModelFacade::new("Dummy", Params::new())?;
//! facade.fit(&x, &y)?;
//! assert_eq!(facade.predict(&x)?.len(), 2);
//! # Ok::<(), ClassifierError>(())
//! ```

// Core error handling
pub mod error;

// Configuration and catalog
pub mod config;
pub mod params;
pub mod registry;

// Models and model selection
pub mod estimators;
pub mod metrics;
pub mod search;

pub mod facade;

pub use error::{ClassifierError, Result};
pub use facade::ModelFacade;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ClassifierError, Result};

    pub use crate::config::TuningConfig;
    pub use crate::facade::{CandidateScores, Evaluation, ModelFacade, TuneOptions, TuningResult};
    pub use crate::params::{ParamGrid, ParamValue, Params};
    pub use crate::registry::{Algorithm, AlgorithmRegistry};

    pub use crate::estimators::{Classifier, FromParams};
    pub use crate::metrics::{ConfusionMatrix, Scoring};
    pub use crate::search::{GridSearchCV, SearchCapability, SearchOptions, SearchOutcome};
}
