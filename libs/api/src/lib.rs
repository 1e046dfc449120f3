pub mod path;
pub mod request;
pub mod response;
pub mod signaling;
