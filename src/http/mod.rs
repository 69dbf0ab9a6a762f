pub mod dump;
pub mod request;
pub mod response;

pub use request::{Input, Request};
pub use response::Response;
