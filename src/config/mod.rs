pub use self::parser::{
    BridgeConfig, ChatConfig, Config, LoggingConfig, MatrixConfig, StateConfig, WebConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
