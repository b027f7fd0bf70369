pub mod domain;
pub mod ports;
pub mod query;

pub use domain::{
    Bookmark, BookmarkChanges, BookmarkDetails, Folder, FolderChanges, NewBookmark,
    NewFolder, NewTag, Notification, RecordState, Tag, TagChanges, UrlMetadata, User,
    UserCredentials, Verification, VerificationKind, MAX_CODE_ATTEMPTS,
};
pub use ports::{DatabaseService, MetadataService, NotificationSender, PortError, PortResult};
pub use query::{has_all_tags, BookmarkQuery, BookmarkSort, NameQuery, Page, PageMeta, Pagination};
