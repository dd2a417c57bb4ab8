//! orthodsf - compiles orthophoto terrain meshes into X-Plane DSF tiles

pub mod core;
pub mod geo;
pub mod mesh;
pub mod bathymetry;
pub mod pool;
pub mod terrain;
pub mod fetch;
pub mod dsf;
pub mod compile;
