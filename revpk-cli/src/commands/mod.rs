pub mod flags;
pub mod get;
pub mod init;
pub mod list;
pub mod optimize;
pub mod unpack;
pub mod verify;

/// Commands surface any library error; main renders it as `error: …`.
pub type CliResult = Result<(), Box<dyn std::error::Error>>;
