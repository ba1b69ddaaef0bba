pub mod admin;
pub mod database;
pub mod iban;
pub mod notify;
pub mod responses;
pub mod routes;
pub mod schema;
pub mod sync;
