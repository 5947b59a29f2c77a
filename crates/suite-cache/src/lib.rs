pub mod cache;
pub mod invalidator;
pub mod slot;
pub mod snapshot;

pub use cache::*;
pub use invalidator::*;
pub use slot::*;
pub use snapshot::*;

#[cfg(test)]
mod tests {
    use super::{
        CacheSnapshot, InvalidatorSnapshot, LineSlot, MethodVerdict, StaticInvalidator,
        TestCaseCache,
    };
    use std::any::TypeId;

    #[test]
    fn crate_root_reexports_cache_types() {
        let _ = TypeId::of::<TestCaseCache>();
        let _ = TypeId::of::<StaticInvalidator>();
        let _ = TypeId::of::<MethodVerdict>();
        let _ = TypeId::of::<LineSlot>();
        let _ = TypeId::of::<CacheSnapshot>();
        let _ = TypeId::of::<InvalidatorSnapshot>();
    }
}
