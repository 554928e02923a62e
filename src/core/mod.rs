pub mod errors;
pub mod helpers;
pub mod notice;
pub mod query_params;
pub mod static_server;
