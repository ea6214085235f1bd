pub mod error_payload;
pub mod pdf;
