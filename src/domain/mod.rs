pub mod probe;
pub mod record;
pub mod store;
