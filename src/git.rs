//! Local git checkout as a commit source and content fetcher.

pub mod repository;

pub use repository::LocalRepository;
