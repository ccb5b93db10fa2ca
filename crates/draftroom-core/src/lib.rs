// Library root: the live draft engine and its storage, catalog, event and
// timer collaborators.

pub mod catalog;
pub mod coordinator;
pub mod db;
pub mod draft;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod store;

pub use coordinator::{DraftCoordinator, NewDraft};
pub use error::DraftError;
