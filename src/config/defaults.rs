//! Default value functions for configuration fields.

use super::logging::LogFormat;

pub const fn default_port() -> u16 {
    3536
}

pub const fn default_host_id() -> u32 {
    1
}

pub const fn default_heartbeat_interval_secs() -> u64 {
    30
}

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    true
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
