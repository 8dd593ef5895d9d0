pub mod backup;
pub mod file;
pub mod file_log;
pub mod profile;
pub mod session;
pub mod workstation;
