//! # Tsunagi (繋ぎ)
//!
//! Compose units of business logic into pipelines that share one state,
//! wrap them with hooks, and roll back automatically when a unit fails.
//!
//! The name "Tsunagi" (繋ぎ) means "a link" or "a connection" in Japanese:
//! each unit is a link, and an organizer is the chain they form.
//!
//! ## Features
//!
//! - **Units**: a [`Unit`] has core logic, an optional compensating rollback,
//!   declared inputs/outputs ([`Contract`]) and hooks ([`HookChain`])
//! - **Organizers**: an [`Organizer`] runs units in order and is itself a unit,
//!   so pipelines nest
//! - **Rollback**: completed units are ledgered in the shared [`State`] and
//!   rolled back newest first when anything fails
//! - **Two entry points**: [`call`](UnitExt::call) reports a business failure
//!   in its [`Outcome`], [`call_strict`](UnitExt::call_strict) returns it as
//!   an error; contract violations and faults are errors in both
//! - **Structured errors** with `thiserror`, logging with `tracing`
//!
//! ## Quick Start
//!
//! ```rust
//! use tsunagi::prelude::*;
//!
//! define_unit!(LoadData);
//!
//! impl Unit for LoadData {
//!     fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
//!         state.set("data", "Hello, Tsunagi!".to_string());
//!         Ok(())
//!     }
//! }
//!
//! let state = LoadData::call_strict(Attributes::new()).expect("unit failed");
//! assert_eq!(state.get::<String>("data").map(String::as_str), Some("Hello, Tsunagi!"));
//! ```
//!
//! ## Pipelines With Rollback
//!
//! ```rust
//! use tsunagi::prelude::*;
//!
//! define_unit!(Charge);
//! define_unit!(Ship);
//!
//! impl Unit for Charge {
//!     fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
//!         state.set("charged", true);
//!         Ok(())
//!     }
//!
//!     fn rollback(&mut self, state: &mut State) -> Result<(), UnitError> {
//!         state.set("charged", false);
//!         Ok(())
//!     }
//! }
//!
//! impl Unit for Ship {
//!     fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
//!         Err(state.fail_with(Attributes::new().with("error", "no courier".to_string())))
//!     }
//! }
//!
//! let checkout = Organizer::builder("Checkout")
//!     .add::<Charge>()
//!     .add::<Ship>()
//!     .build();
//!
//! let outcome = checkout.invoke(Attributes::new()).expect("no contract violation");
//! assert!(outcome.is_failure());
//! assert_eq!(outcome.state().get::<bool>("charged"), Some(&false));
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use tsunagi::prelude::*;
//!
//! define_unit!(NeedsCard);
//!
//! impl Unit for NeedsCard {
//!     fn contract(&self) -> Contract {
//!         Contract::new().input(Field::new("card").typed::<String>())
//!     }
//! }
//!
//! match NeedsCard::call_strict(Attributes::new()) {
//!     Ok(_) => println!("charged"),
//!     Err(CallError::Failed(failure)) => {
//!         eprintln!("business failure: {}", failure.state().status());
//!     }
//!     Err(CallError::Unit(UnitError::Contract(violation))) => {
//!         eprintln!("contract violation: {}", violation);
//!     }
//!     Err(error) => eprintln!("Error: {}", error),
//! }
//! ```

mod audit;
mod contract;
mod error;
mod hooks;
mod organizer;
mod state;
mod unit;

pub mod prelude;

pub use audit::{AuditEvent, AuditLog, AuditRecord};
pub use contract::{Contract, Field, ValueType};
pub use error::{
    CallError, CompensationError, ContractViolation, Direction, Failure, RollbackError, UnitError,
};
pub use hooks::{HookChain, HookKind, Next};
pub use organizer::{Organizer, OrganizerBuilder};
pub use state::{Attributes, RollbackPolicy, State, StateKey, Status};
pub use unit::{run, run_strict, Outcome, Unit, UnitExt, UnitName};

/// Macro to define a unit with minimal boilerplate
///
/// This macro creates a unit struct with:
/// - `const NAME: &'static str` - compile-time unit name
/// - `Debug` and `Clone` derives
/// - `Default` implementation
///
/// # Example
///
/// ```rust
/// use tsunagi::define_unit;
///
/// define_unit!(MyUnit);
/// assert_eq!(MyUnit::NAME, "MyUnit");
/// ```
#[macro_export]
macro_rules! define_unit {
    ($name:ident) => {
        #[derive(Debug, Clone)]
        pub struct $name;

        impl $name {
            /// Unit name as a compile-time constant
            #[allow(dead_code)]
            pub const NAME: &'static str = stringify!($name);
        }

        impl Default for $name {
            fn default() -> Self {
                Self
            }
        }
    };
}
