//! turnstile-db: an asynchronous handle around one SQLite connection.
//!
//! Operations are issued from anywhere without waiting for earlier ones.
//! A single connection task decides, per call, whether it may run now or
//! must queue behind exclusive work, runs bodies on blocking worker threads,
//! and delivers every completion and notification itself.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use turnstile_db::{ConfigureOption, Database, OpenFlags};
//!
//! #[tokio::main]
//! async fn main() {
//!     let db = Database::connect(":memory:", OpenFlags::default()).await.unwrap();
//!
//!     db.configure(ConfigureOption::BusyTimeout(5000)).await.unwrap();
//!     db.exec("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)").await.unwrap();
//!
//!     let n: i64 = db
//!         .run(false, |conn| Ok(conn.query_row("SELECT count(*) FROM kv", [], |r| r.get(0))?))
//!         .await
//!         .unwrap();
//!     println!("{n} rows");
//!
//!     db.close().await.unwrap();
//! }
//! ```

mod actor;
pub mod call;
pub mod database;
mod engine;
mod mode;
pub mod options;
mod worker;

pub use call::Callback;
pub use database::{Database, Reply, Request};
pub use options::ConfigureOption;
pub use rusqlite::{Connection, OpenFlags};
pub use turnstile_core::{DatabaseError, Event, Result};
pub use turnstile_scheduler::{ConnectionState, Status};
