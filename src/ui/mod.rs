//! Line-oriented terminal front end.
//!
//! Commands are read one line at a time from stdin and results are printed
//! as plain text to stdout; there is no screen drawing. Only reads the
//! controller's exposed state and issues its commands.
//!
//! - `loop_runner` - Main event loop
//! - `input` - Command parsing and dispatch
//! - `output` - Plain-text printing of items, aggregates and notices

mod input;
mod loop_runner;
mod output;

pub use loop_runner::{run, Action};
