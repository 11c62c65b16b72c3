//! SQLCipher persistence for connections, records and pipeline state

mod briefing_outbox_repository;
mod calendar_event_repository;
mod connection_repository;
mod mail_message_repository;
mod manager;
mod support;
mod sync_lock_repository;
mod sync_status_repository;

pub use briefing_outbox_repository::{BriefingOutboxEntry, SqlCipherBriefingOutbox};
pub use calendar_event_repository::SqlCipherCalendarEventRepository;
pub use connection_repository::SqlCipherConnectionRepository;
pub use mail_message_repository::SqlCipherMailMessageRepository;
pub use manager::DbManager;
pub use sync_lock_repository::SqlCipherSyncLockRepository;
pub use sync_status_repository::SqlCipherSyncStatusRepository;
