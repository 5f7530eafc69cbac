// Public API - the runner plus the engine and its collaborators
pub mod runner;

pub mod db;
pub mod engine;
pub mod error;
pub mod formats;
pub mod io;

// Internal modules
mod config;

#[cfg(test)]
mod integ_tests;
