pub mod activity;
pub mod league;
pub mod scores;

pub use activity::*;
pub use league::*;
pub use scores::*;
