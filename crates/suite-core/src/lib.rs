pub mod cancel;
pub mod config;
pub mod events;
pub mod process;
pub mod report;
pub mod source;
pub mod state;
pub mod types;
pub mod validation;

pub use cancel::*;
pub use config::*;
pub use events::*;
pub use process::*;
pub use report::*;
pub use source::*;
pub use state::*;
pub use types::*;
pub use validation::*;
