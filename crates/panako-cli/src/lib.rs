//! Panako CLI - shared output helpers for the `panako` binary

pub mod output;
