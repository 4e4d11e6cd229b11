//! Declarative YAML configuration
//!
//! # Example
//!
//! ```yaml
//! cross_entropy:
//!   scaling: mean
//!
//! gradcheck:
//!   epsilon: 0.01
//!   tolerance: 0.05
//! ```

mod load;
mod schema;
mod validate;


pub use load::{load_config, parse_config};
pub use schema::{CrossEntropyScaling, CrossEntropySpec, EngineConfig, GradCheckConfig};
pub use validate::{validate_config, ValidationError};
