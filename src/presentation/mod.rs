//! HTML documents assembled from rendered fragments.

pub mod views;
