pub mod postgres;

pub use postgres::PostgresOrderStore;
