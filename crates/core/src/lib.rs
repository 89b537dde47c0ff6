pub mod command;
pub mod parser;
pub mod result;

pub use command::{
    Command, CommandBody, CommandError, CommandKind, HudModule, MediaAction, NotificationLevel,
    Priority, SearchScope, Theme,
};
pub use parser::{commands_from_text, parse_proposal};
pub use result::CommandResult;
