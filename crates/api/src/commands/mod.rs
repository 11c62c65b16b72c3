//! Commands - the surface polling callers talk to

mod calendar;
mod connections;
mod sync;

pub use calendar::*;
pub use connections::*;
pub use sync::*;
