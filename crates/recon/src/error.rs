use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty name, no sources, bad tolerance).
    ConfigValidation(String),
    /// Two sources declared under the same name.
    DuplicateSource(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::DuplicateSource(name) => write!(f, "source '{name}' is declared more than once"),
        }
    }
}

impl std::error::Error for ReconError {}
