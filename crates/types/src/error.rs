use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("unknown {kind}: {value:?}")]
    UnknownValue { kind: &'static str, value: String },
}

impl TypeError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        TypeError::UnknownValue {
            kind,
            value: value.to_string(),
        }
    }
}
