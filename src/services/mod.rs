pub mod dwd;
pub mod matcher;
pub mod poller;
