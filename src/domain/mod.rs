pub mod checkout;
pub mod commands;
pub mod errors;
pub mod inventory;
pub mod value_objects;

pub use errors::*;
pub use value_objects::*;
