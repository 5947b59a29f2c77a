pub mod adapter;
pub mod args;
pub mod diagnostics;
pub mod error;
pub mod java;
pub mod progress;
pub mod runner;
pub mod types;

pub use adapter::*;
pub use args::*;
pub use diagnostics::*;
pub use error::*;
pub use java::*;
pub use progress::*;
pub use runner::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::{
        EngineAdapter, EngineError, EngineRequest, EngineRunResult, EngineSupervisor,
        JarEngineAdapter, JavaVersion, OutputDiagnostics, ProgressParser, TargetRejection,
    };
    use std::any::TypeId;

    #[test]
    fn crate_root_reexports_engine_types() {
        let _ = TypeId::of::<EngineSupervisor>();
        let _ = TypeId::of::<EngineRequest>();
        let _ = TypeId::of::<EngineRunResult>();
        let _ = TypeId::of::<EngineError>();
        let _ = TypeId::of::<ProgressParser>();
        let _ = TypeId::of::<JarEngineAdapter>();
        let _ = TypeId::of::<JavaVersion>();
        let _ = TypeId::of::<OutputDiagnostics>();
        let _ = TypeId::of::<TargetRejection>();
        let _ = TypeId::of::<Box<dyn EngineAdapter>>();
    }
}
