pub mod entry;
pub mod event;
pub mod message;
pub mod subject;

pub use entry::{display_date, parse_date, Entry, EntryUpdate};
pub use event::{InvocationResult, TriggerEvent};
pub use message::{Message, NewMessage, Role, ASSISTANT_UID, IMAGE_ONLY_PLACEHOLDER};
pub use subject::Subject;
