//! Everything that talks to the external package manager: invocation, output
//! parsing and provenance enrichment.

pub mod enricher;
pub mod parser;
pub mod runner;

pub use enricher::SourceEnricher;
pub use parser::{JsonOutdatedParser, OutdatedListingParser, TieredTextParser};
pub use runner::{BrewRunner, ProcessTracker, resolve_brew_executable};

use std::sync::Arc;

use crate::models::{BrewCommands, CoreError};

pub type BrewResult<T> = Result<T, CoreError>;

/// Picks the listing parser matching the configured listing flags.
pub fn parser_for(commands: &BrewCommands) -> Arc<dyn OutdatedListingParser> {
    if commands.listing_requests_json() {
        Arc::new(JsonOutdatedParser)
    } else {
        Arc::new(TieredTextParser)
    }
}
