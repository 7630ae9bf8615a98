//! Product-specific knowledge: RCM layout rules and Sentinel-1 compound
//! builders. Everything generic lives in `core`.
pub mod rcm;
pub mod sentinel1;
