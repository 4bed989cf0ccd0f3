mod protocol;
mod transport;

pub use protocol::{encode_framed, read_message, ScopeMessage};
pub use transport::{FramedNotifier, JsonLinesNotifier, MemoryNotifier, Notifier, NullNotifier};
