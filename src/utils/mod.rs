//! Utility helpers shared across the sync core

pub mod url;
