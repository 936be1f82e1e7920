//! A multi-peak nonlinear curve-fitting engine for one-dimensional
//! scientific data: background and peak theories, peak-parameter
//! estimation, a constraint language, and a fit driver that couples
//! estimation with an external least-squares solver, including an MCA
//! residual-discovery loop.

pub mod background;
pub mod baseline;
pub mod config;
pub mod constraint;
pub mod driver;
pub mod error;
pub mod estimate;
pub mod mca;
pub mod models;
pub mod peak_search;
pub mod registry;
pub mod solver;

pub use config::FitConfig;
pub use constraint::Constraint;
pub use driver::{FitDriver, FitEvent, FitState, Parameter};
pub use error::FitError;
