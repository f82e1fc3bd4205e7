//! One-way channel from the probes to the userspace consumer.

/// The channel refused a record, usually because its backlog is full. The
/// record is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitError {
    Dropped(i64),
}

/// Non-blocking, best-effort enqueue of a fixed-layout record.
pub trait EventSink<T> {
    fn emit(&self, record: &T) -> Result<(), EmitError>;
}
