//! Declared inputs and outputs of a unit.

use crate::error::{ContractViolation, Direction};
use crate::state::{State, StateKey};
use crate::unit::UnitName;
use std::any::{type_name, Any};
use std::fmt;

fn is_type<T: Any>(value: &dyn Any) -> bool {
    value.is::<T>()
}

/// A runtime type constraint for a declared value.
///
/// # Examples
///
/// ```
/// use tsunagi::ValueType;
///
/// let amount = ValueType::of::<u64>();
/// assert!(amount.matches(&10u64));
/// assert!(!amount.matches(&"10"));
///
/// // Accept a family of compatible types
/// let integer = ValueType::new("integer", |v| v.is::<i32>() || v.is::<i64>());
/// assert!(integer.matches(&1i32));
/// assert!(integer.matches(&1i64));
/// ```
#[derive(Clone, Copy)]
pub struct ValueType {
    name: &'static str,
    matcher: fn(&dyn Any) -> bool,
}

impl ValueType {
    /// Accepts values of exactly type `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            name: type_name::<T>(),
            matcher: is_type::<T>,
        }
    }

    /// Accepts any value for which `matcher` returns `true`.
    pub fn new(name: &'static str, matcher: fn(&dyn Any) -> bool) -> Self {
        Self { name, matcher }
    }

    /// Returns the type name used in error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if `value` satisfies this constraint.
    pub fn matches(&self, value: &dyn Any) -> bool {
        (self.matcher)(value)
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueType").field(&self.name).finish()
    }
}

/// A single declared input or output.
#[derive(Debug, Clone)]
pub struct Field {
    key: StateKey,
    ty: Option<ValueType>,
    optional: bool,
}

impl Field {
    /// A required, untyped field.
    pub fn new(key: impl Into<StateKey>) -> Self {
        Self {
            key: key.into(),
            ty: None,
            optional: false,
        }
    }

    /// Constrains the field to values of type `T`.
    pub fn typed<T: Any>(self) -> Self {
        self.with_type(ValueType::of::<T>())
    }

    /// Constrains the field with a custom [`ValueType`].
    pub fn with_type(mut self, ty: ValueType) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Allows the field to be absent.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Returns the state key this field declares.
    pub fn key(&self) -> &StateKey {
        &self.key
    }

    /// Returns the declared type, if any.
    pub fn value_type(&self) -> Option<&ValueType> {
        self.ty.as_ref()
    }

    /// Returns `true` if the field may be absent.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    fn check(
        &self,
        unit: &UnitName,
        state: &State,
        direction: Direction,
    ) -> Result<(), ContractViolation> {
        match state.value(self.key.as_str()) {
            None if self.optional => Ok(()),
            None => Err(direction.missing(unit.clone(), self.key.clone())),
            Some(value) => match &self.ty {
                Some(ty) if !ty.matches(value) => {
                    Err(direction.mismatch(unit.clone(), self.key.clone(), ty.name()))
                }
                _ => Ok(()),
            },
        }
    }
}

impl From<&str> for Field {
    fn from(key: &str) -> Self {
        Field::new(key)
    }
}

impl From<String> for Field {
    fn from(key: String) -> Self {
        Field::new(key)
    }
}

/// The declared inputs and outputs of a unit type.
///
/// Built once per type; a more specific unit copies its parent's contract
/// with [`Contract::inherit`] and appends to it.
///
/// # Examples
///
/// ```
/// use tsunagi::{Contract, Field};
///
/// let base = Contract::new().input(Field::new("order_id").typed::<u64>());
///
/// let charge = Contract::inherit(&base)
///     .input(Field::new("coupon").typed::<String>().optional())
///     .output(Field::new("receipt").typed::<String>());
///
/// assert_eq!(base.inputs().len(), 1);
/// assert_eq!(charge.inputs().len(), 2);
/// assert_eq!(charge.outputs().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Contract {
    inputs: Vec<Field>,
    outputs: Vec<Field>,
}

impl Contract {
    /// Creates an empty contract.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies a parent contract so it can be extended.
    pub fn inherit(parent: &Contract) -> Self {
        parent.clone()
    }

    /// Declares an input.
    pub fn input(mut self, field: impl Into<Field>) -> Self {
        self.inputs.push(field.into());
        self
    }

    /// Declares an output.
    pub fn output(mut self, field: impl Into<Field>) -> Self {
        self.outputs.push(field.into());
        self
    }

    /// Returns the declared inputs, in declaration order.
    pub fn inputs(&self) -> &[Field] {
        &self.inputs
    }

    /// Returns the declared outputs, in declaration order.
    pub fn outputs(&self) -> &[Field] {
        &self.outputs
    }

    /// Checks every declared input against the state.
    ///
    /// # Errors
    ///
    /// Returns the first violated input, in declaration order.
    pub fn check_inputs(&self, unit: &UnitName, state: &State) -> Result<(), ContractViolation> {
        self.inputs
            .iter()
            .try_for_each(|field| field.check(unit, state, Direction::Input))
    }

    /// Checks every declared output against the state.
    ///
    /// # Errors
    ///
    /// Returns the first violated output, in declaration order.
    pub fn check_outputs(&self, unit: &UnitName, state: &State) -> Result<(), ContractViolation> {
        self.outputs
            .iter()
            .try_for_each(|field| field.check(unit, state, Direction::Output))
    }
}
