pub mod reading;

pub use reading::{EndpointCredential, Reading};
