use serde::{Deserialize, Deserializer, Serialize};
use validator::ValidateLength;

/// Nullable field of an update body: an absent key leaves the column alone,
/// `null` clears it. Needs `#[serde(default)]` on the containing struct.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum OptionField<T> {
    Unchanged,
    SetToNull,
    SetToValue(T),
}

impl<T> Default for OptionField<T> {
    fn default() -> Self {
        OptionField::Unchanged
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OptionField<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer)
            .map(|value| value.map_or(OptionField::SetToNull, OptionField::SetToValue))
    }
}

impl<T: ValidateLength<u64>> ValidateLength<u64> for OptionField<T> {
    fn length(&self) -> Option<u64> {
        self.value_ref().and_then(|value| value.length())
    }

    fn validate_length(&self, min: Option<u64>, max: Option<u64>, equal: Option<u64>) -> bool {
        self.value_ref()
            .is_none_or(|value| value.validate_length(min, max, equal))
    }
}

impl<T> OptionField<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    /// The new value, if one was sent.
    pub fn value_ref(&self) -> Option<&T> {
        match self {
            Self::SetToValue(v) => Some(v),
            _ => None,
        }
    }

    pub fn apply(&self, current: Option<T>) -> Option<T>
    where
        T: Clone,
    {
        match self {
            Self::Unchanged => current,
            Self::SetToNull => None,
            Self::SetToValue(v) => Some(v.clone()),
        }
    }
}

impl<T> From<Option<Option<T>>> for OptionField<T> {
    fn from(opt: Option<Option<T>>) -> Self {
        match opt {
            None => OptionField::Unchanged,
            Some(None) => OptionField::SetToNull,
            Some(Some(v)) => OptionField::SetToValue(v),
        }
    }
}
