//! Minimal HTTP/1.1 client for the browser discovery endpoints.

pub mod response;
pub mod responsebody;
pub mod streamfactory;

pub use response::HttpResponse;
pub use responsebody::ResponseBody;
pub use streamfactory::{HttpStream, HttpStreamFactory};
