// Adapters layer: concrete implementations of the domain ports (feeds, storage).

pub mod csv_feed;
pub mod storage;

pub use csv_feed::CsvFeed;
pub use storage::LocalStorage;
