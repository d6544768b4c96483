//! strata: asynchronous property values and the engine wire codec for an
//! infrastructure SDK.
//!
//! [`output::Output`] carries a value together with the resources it came
//! from and whether it is known and secret. The [`serialization`] module
//! turns property graphs into engine wire values and back, and
//! [`deployment::Deployment`] registers resources against a
//! [`transport::Monitor`].

pub mod args;
pub mod asset;
pub mod cli;
pub mod core;
pub mod deployment;
pub mod error;
pub mod logging;
pub mod output;
pub mod property;
pub mod resources;
pub mod serialization;
pub mod transport;

pub use error::{Error, Result};
pub use output::{Output, OutputData};
pub use property::Property;
