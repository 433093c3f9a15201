pub mod init;
pub mod rebuild;
pub mod report;
pub mod taxa;
pub mod verify;
