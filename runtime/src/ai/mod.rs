pub mod responses;
pub mod schemas;

pub use responses::ResponsesClient;
