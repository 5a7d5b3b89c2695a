pub mod commands;
pub mod speed_commands;

pub use commands::Cli;
pub use speed_commands::SpeedCommandHandler;
