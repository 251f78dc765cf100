pub mod db;
pub mod mail;
pub mod orm;
pub mod schema;
pub mod session;
pub mod user;
pub mod validate;
pub mod web;

pub use db::get_db_pool;
