//! Domain types and models

pub mod connection;
pub mod dlp;
pub mod items;
pub mod records;
pub mod sync;

pub use connection::{
    Connection, ConnectionMetadata, ConnectionStatus, Provider, SyncCheckpoint,
};
pub use dlp::{Redacted, ScanResult, TokenMap, VaultToken};
pub use items::{CalendarRef, FetchResult, MessageRef, ProviderItem, SyncWindow};
pub use records::{CalendarEvent, CreateEventOutcome, EventDraft, EventStatus, MailMessage};
pub use sync::{
    PollOutcome, SyncCompleted, SyncOutcome, SyncReport, SyncState, SyncStatus, SyncTask,
    SyncTrigger,
};
