pub mod db;
pub mod metadata;
pub mod notifier;

pub use db::DbAdapter;
pub use metadata::HttpMetadataAdapter;
pub use notifier::{LogNotifier, ResendNotifier};
