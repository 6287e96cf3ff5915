pub mod prober;
pub mod source_fetch;
pub mod store_client;
