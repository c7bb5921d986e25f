//! CLI domain: parse, route and presentation only.
//! No sweep logic lives here; commands dispatch to the sweeper and store.

mod parse;
mod presentation;
mod route;

pub use parse::{Cli, Commands};
pub use route::RunContext;
