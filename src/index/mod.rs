pub mod forward;
pub mod boundary;
pub mod builder;
pub mod query;
