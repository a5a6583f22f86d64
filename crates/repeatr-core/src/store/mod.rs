// ── Persisted router state ──
//
// Small single-writer records under the state directory. Each record is a
// whole file replaced atomically, so a crash mid-write leaves the previous
// value in place.

mod files;
mod lock;

pub use files::{StateStore, write_atomic};
pub use lock::ModeLock;
