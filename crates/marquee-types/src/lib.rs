pub mod validator;

pub use validator::{ValidationErrors, Validator};
