//! Publish sinks and their transports

pub mod archive;
pub mod messaging;
pub mod notification;
pub mod object_store;

pub use archive::ArchiveSink;
pub use messaging::{HttpMessageBus, MessageBus, NotifierMessage};
pub use notification::{HttpMailer, Mailer, Notification, NotificationTemplate};
pub use object_store::{HttpObjectStore, ObjectStore, OutputUploader};
