pub mod json_sink;
pub mod result_sink;

pub use json_sink::{JsonResultSink, PhotoRecord};
pub use result_sink::ResultSink;
