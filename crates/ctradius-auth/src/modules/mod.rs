//! Built-in authorization modules

pub mod groups;
pub mod guests;

pub use groups::GroupsModule;
pub use guests::GuestsModule;
