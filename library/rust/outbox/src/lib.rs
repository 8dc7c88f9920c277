//! yeelo-outbox: トランザクショナルアウトボックスパターンの実装。
//!
//! 業務データの更新と同一トランザクションでイベントを保存し、
//! リレー（OutboxProcessor）が非同期に Kafka 等へ配信する。
//! 複数レプリカが同じ行を同時に配信しないよう、取得はリース付きで行う。

pub mod error;
pub mod message;
pub mod processor;
pub mod store;

#[cfg(feature = "postgres")]
pub mod postgres_store;

pub use error::OutboxError;
pub use message::{OutboxMessage, OutboxStatus};
pub use processor::{OutboxProcessor, OutboxPublisher};
pub use store::OutboxStore;

#[cfg(feature = "postgres")]
pub use postgres_store::PostgresOutboxStore;
