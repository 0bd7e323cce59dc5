pub mod assessment;
pub mod enums;
pub mod patient;

pub use assessment::*;
pub use enums::*;
pub use patient::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
}
