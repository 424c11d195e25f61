pub mod espn;
pub mod factory;
mod http;
pub mod sleeper;
mod traits;

pub use espn::EspnSource;
pub use factory::{build_league_source, build_league_sources};
pub use sleeper::SleeperSource;
pub use traits::LeagueSource;

#[cfg(test)]
pub use traits::MockLeagueSource;
