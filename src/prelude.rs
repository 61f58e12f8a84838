//! Commonly used types and traits

pub use crate::define_unit;
pub use crate::error::{CallError, UnitError};
pub use crate::contract::{Contract, Field};
pub use crate::hooks::HookChain;
pub use crate::organizer::Organizer;
pub use crate::state::{Attributes, State};
pub use crate::unit::{Outcome, Unit, UnitExt, UnitName};
