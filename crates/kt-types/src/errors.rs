use thiserror::Error;

/// Main error type for the kerntune system
#[derive(Error, Debug)]
pub enum KtError {
    #[error("Search space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Restriction error: {0}")]
    Restriction(#[from] RestrictionError),

    #[error("Strategy option error: {0}")]
    Option(#[from] OptionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while building or querying a search space
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("No tunable parameters declared")]
    NoParameters,

    #[error("Parameter {name} has an empty domain")]
    EmptyDomain { name: String },

    #[error("Parameter {name} is declared more than once")]
    DuplicateParameter { name: String },

    #[error("Parameter {name} lists value {value} more than once")]
    DuplicateValue { name: String, value: String },

    #[error("Restriction set admits no legal configuration")]
    NoLegalConfigurations,

    #[error("Search space too large: {product} combinations exceeds limit {limit}")]
    TooLarge { product: u128, limit: u128 },}

/// Errors raised while compiling or evaluating a restriction expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RestrictionError {
    #[error("Unexpected character '{found}' at offset {offset} in \"{expr}\"")]
    UnexpectedChar { expr: String, found: char, offset: usize },

    #[error("Unterminated string literal at offset {offset} in \"{expr}\"")]
    UnterminatedString { expr: String, offset: usize },

    #[error("Invalid number literal \"{literal}\" in \"{expr}\"")]
    InvalidNumber { expr: String, literal: String },

    #[error("Parse error in \"{expr}\": {message}")]
    Parse { expr: String, message: String },

    #[error("Restriction \"{expr}\" references unknown parameter {name}")]
    UnknownParameter { expr: String, name: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Type error: {message}")]
    Type { message: String },
}

/// Errors raised while reading strategy options
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptionError {
    #[error("Unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("Option {option} expects {expected}, got {found}")]
    WrongType {
        option: String,
        expected: String,
        found: String,
    },

    #[error("Option {option} has invalid value {value}: {message}")]
    InvalidValue {
        option: String,
        value: String,
        message: String,
    },
}

/// Result type alias for kerntune operations
pub type KtResult<T> = Result<T, KtError>;
