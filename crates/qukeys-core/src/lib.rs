pub mod config;
pub mod event_queue;
pub mod event_tracker;
pub mod host;
pub mod keycodes;
pub mod pipeline;
pub mod qukeys;
pub mod script;
pub mod types;

pub use config::{load_config, ConfigError, Parameter, QukeysConfig};
pub use event_queue::EventQueue;
pub use event_tracker::KeyEventTracker;
pub use host::Host;
pub use pipeline::{Keymap, Pipeline};
pub use qukeys::{Qukey, Qukeys, QukeysSettings};
pub use types::{layer_tap, mod_tap, HandlerResult, KeyEdge, KeyEvent, KeyPosition, LogicalKey};
