//! Command implementations

pub(crate) mod graft;
pub(crate) mod inspect;
pub(crate) mod plan;
pub(crate) mod presets;
