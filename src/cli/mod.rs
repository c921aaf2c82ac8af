pub mod init;
pub mod stats;
pub mod tools;
pub mod voice;
