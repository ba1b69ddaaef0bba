pub mod connect;
pub mod idgen;
pub mod ledger;
pub mod models;
pub mod mutations;
pub mod queries;
