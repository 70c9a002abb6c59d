//! Form State Machine
//!
//! - **Types** - Snapshot shape, field metadata, repeatable-section instances
//! - **Actions** - Typed intent messages
//! - **Reducer** - Pure `(state, action) -> state`
//! - **Selectors** - Derived flags and views
//! - **Store** - Single serialized write point plus a snapshot change feed

pub mod actions;
pub mod reducer;
pub mod selectors;
pub mod store;
pub mod types;

pub use actions::FormAction;
pub use reducer::reduce;
pub use store::FormStore;
pub use types::{
    AutosaveState, ConflictResolution, FieldKey, FieldState, FormState, InstanceRef,
    RepeatableSectionState, SectionInstance,
};
