//! vtour-core library interface
//!
//! Geographic markers with lazily fetched photo albums:
//! - [`transport`]: HTTP execution and cancellation
//! - [`catalog`]: remote image search and album sampling
//! - [`model`]: markers, photos and their ordering
//! - [`store`]: interactive / buffering / disk persistence pipeline
//! - [`service`]: the facade a front end drives

pub mod catalog;
pub mod error;
pub mod model;
pub mod service;
pub mod store;
pub mod transport;

pub use crate::error::{Error, Result};
pub use crate::model::{MapRegion, Marker, Photo};
pub use crate::service::TourService;
pub use crate::store::Store;
