pub mod topology;
pub mod validation;

pub use validation::Validator;
