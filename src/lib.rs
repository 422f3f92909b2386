//! Record management over SQLite: entity schemas, a query builder, a
//! role-gated table controller and the store gateway it drives.

pub mod entity;
pub mod error;
pub mod form;
pub mod query;
pub mod record;
pub mod role;
pub mod store;
pub mod table;

pub use error::{Error, Result};
