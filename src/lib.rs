//! Closed-loop telescope control core: goto centering, polar-axis
//! estimation, and guiding, over swappable hardware ports.

pub mod angles;
pub mod backend;
pub mod config;
pub mod error;
pub mod guide;
pub mod pointing;
pub mod polar;
pub mod session;
pub mod solving;
