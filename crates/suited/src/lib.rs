pub mod delivery;
pub mod error;
pub mod event_log;
pub mod pending;
pub mod pipeline;
pub mod reporter;
pub mod single_flight;
pub mod state_machine;
pub mod state_store;
pub mod watcher;

pub use delivery::*;
pub use error::*;
pub use event_log::*;
pub use pending::*;
pub use pipeline::*;
pub use reporter::*;
pub use single_flight::*;
pub use state_machine::*;
pub use state_store::*;
pub use watcher::*;
