//! # Tensorgrad: Reverse-Mode Automatic Differentiation
//!
//! Tensorgrad records operations on [`Tensor`] values into a dynamic graph and
//! computes gradients with a dependency-counted backward pass. A node shared
//! by several downstream paths waits until every path has reported before it
//! forwards its accumulated gradient.
//!
//! ## Architecture
//!
//! - **autograd**: Tensor nodes, the operation catalog and the backward driver
//! - **gradcheck**: Finite-difference gradient verification
//! - **config**: Declarative YAML configuration
//! - **error**: Error types shared across the crate
//!
//! ## Example
//!
//! ```
//! use tensorgrad::Tensor;
//!
//! let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
//! let y = &x + &x;
//! y.backward(None).unwrap();
//! assert_eq!(x.grad().unwrap().as_slice().unwrap(), &[2.0, 2.0, 2.0]);
//! ```

pub mod autograd;
pub mod config;
pub mod gradcheck;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Context, Tensor, TensorId};
pub use config::{CrossEntropyScaling, EngineConfig};
pub use error::{Error, Result};
