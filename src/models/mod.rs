pub mod bulk_response;
pub mod document;
pub mod server_info;
