pub mod command;
pub mod config;
pub mod events;
pub mod package;
pub mod types;

pub use command::{parse_cloud_forward, parse_command, CommandError, SpeechEvent};
pub use config::{Config, ConfigError};
pub use events::{Notification, NotificationEnvelope, NotificationType};
pub use package::{parse_descriptor, AppProfile, PackageError, DESCRIPTOR_FILE};
pub use types::*;
