// Configuration loading

pub mod secrets;
pub mod settings;

pub use secrets::{
    delete_feed_token, feed_token_env_var, get_feed_token, keychain_available, set_feed_token,
    KeyLookup, KeySource, SecretError,
};
pub use settings::{Settings, SettingsError};
