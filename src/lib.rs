//! mangashelf - a manga catalog with ranked, paginated title search.
//!
//! Titles, chapters, ratings and bookmarks live in a single
//! [redb](https://github.com/cberner/redb) file. Search pulls a bounded pool of
//! candidates with a case-insensitive pattern filter, scores it with fixed
//! additive weights and returns one page of the ranked pool.
//!
//! # Quick start
//!
//! ```no_run
//! use chrono::Utc;
//! use mangashelf::{CatalogDb, DataDir};
//! use mangashelf::model::NewTitle;
//! use mangashelf::search::{self, SearchRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let catalog = CatalogDb::open(&data_dir.catalog_db()).unwrap();
//!
//! catalog
//!     .create_title(NewTitle {
//!         title: "Vinland Saga".to_string(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! let request = SearchRequest::new(Some("vinland"), None, Some(10)).unwrap();
//! let page = search::execute_search(
//!     &catalog,
//!     &request,
//!     &CancellationToken::new(),
//!     Utc::now(),
//! )
//! .unwrap();
//! for hit in &page.items {
//!     println!("{} (score: {})", hit.title.title, hit.score);
//! }
//! ```

pub mod catalog_db;
pub mod cli;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod mcp;
pub mod model;
pub mod query_filter;
pub mod rating;
pub mod scorer;
pub mod search;
pub mod server;
pub mod store;
pub mod text_util;

pub use catalog_db::CatalogDb;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use search::{SearchPage, SearchRequest};
pub use store::TitleStore;
