//! Schema Module - Declarative Form Definition
//!
//! A form is plain data that the engine interprets at runtime:
//!
//! 1. **Values** - Uniform field value model and value snapshots
//! 2. **Conditions** - Boolean visibility expressions over values
//! 3. **Rules** - Declarative validation constraints with trigger hints
//! 4. **Types** - Form, section and field definitions plus integrity checks

pub mod condition;
pub mod rules;
pub mod types;
pub mod value;

pub use condition::{Condition, Operator, SimpleCondition};
pub use rules::{RuleKind, Trigger, ValidationRule};
pub use types::{FieldSchema, FieldType, FormSchema, OptionsSource, SectionSchema, SelectOption};
pub use value::{FieldValue, FormValues};
