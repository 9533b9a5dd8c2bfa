use std::fmt::Display;

/// A registry can not provide a shape that a caller asked to prepare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The requested capacity is zero or does not fit a `u16`.
    CapacityOutOfRange { requested: usize },
    /// No binary-eligible shape fits the part of `requested` that is still unaccounted.
    MissingComponent { requested: u16, remaining: u16 },
    /// Neither a static pair constructor nor a covering shape exists for `low + high`.
    NoRealization { requested: u16, low: u16, high: u16 },
    /// The doubling chain stops at `max_span`, too short for `requested`.
    Unrepresentable { requested: u16, max_span: u16 },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::CapacityOutOfRange { requested } => write!(f, "Capacity {} is outside of 1..={}", requested, u16::MAX),
            ConfigurationError::MissingComponent { requested, remaining } => write!(f, "No registered shape covers the remaining {} of {} slots", remaining, requested),
            ConfigurationError::NoRealization { requested, low, high } => write!(f, "Can not realize {} + {} slots while composing {}", low, high, requested),
            ConfigurationError::Unrepresentable { requested, max_span } => write!(f, "Capacity {} exceeds the span of the doubling chain ({})", requested, max_span),
        }
    }
}

impl std::error::Error for ConfigurationError {}
