//! Human input channel.
//!
//! Sources yield [`InputEvent`]s by message passing; the [`InputWatcher`]
//! hands each one to the engine and acknowledges or rejects it at the source.
//! [`DirectoryInputSource`] polls a directory for `<task_id>.json|.md|.txt`
//! files; [`channel_source`] gives an in-process sender for other backends.

mod directory;
mod event;
mod parser;
mod source;
mod watcher;

pub use directory::DirectoryInputSource;
pub use event::InputEvent;
pub use parser::{parse_input_file, parse_payload, task_id_from_path, InputFormat};
pub use source::{channel_source, ChannelInputSource, InputSender, InputSource};
pub use watcher::{InputWatcher, WatchSummary};
