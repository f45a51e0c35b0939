//! Core library for refining hydrological catchment boundaries draped over a
//! triangulated terrain surface.
//!
//! Boundary sections are polylines whose vertices are mesh vertices. The
//! optimisation drivers in [`improvement`] perturb those polylines through the
//! mesh-constrained [`route`] router, score them with a pluggable
//! [`fitness`] strategy and only keep candidates that pass the [`validity`]
//! rules against the water network and the other boundaries.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fitness;
pub mod geometry;
pub mod improvement;
pub mod io;
pub mod route;
pub mod synthetic;
pub mod tin;
pub mod validity;
pub mod water;

pub use error::{CatchmentError, Result};
