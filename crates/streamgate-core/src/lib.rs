pub mod config;

pub use config::{
    ConfigError, GateConfig, LocalConfig, LogConfig, LogFormat, RouteConfig, StreamingConfig,
};
