use crate::{FlowError, FlowResult};

/// One signal sent by a producer: a value or one of the two terminal signals.
///
/// Flows hand emissions across task boundaries (`flow_on`, `buffer`, `zip`,
/// hot-flow subscriptions) as this type.
#[derive(Debug, Clone)]
pub enum Emission<T> {
    Value(T),
    Complete,
    Fault(FlowError),
}

impl<T> Emission<T> {
    /// Terminal signal matching the outcome of a drive
    pub fn terminal(result: FlowResult) -> Self {
        match result {
            Ok(()) => Self::Complete,
            Err(error) => Self::Fault(error),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Value(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}
