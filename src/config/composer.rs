use lazy_static::lazy_static;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

pub const NUM_COMPOSERS: usize = 21;
pub const FIRST_COMPOSER_TOKEN: i64 = 2052;

lazy_static! {
    pub static ref COMPOSER_TO_FEATURE_TOKEN: ComposerTokens = ComposerTokens::new();
}

/// Reserved feature tokens for each composer style, `composer1` to `composer21`.
///
/// There is a single instance of this table per process, see [COMPOSER_TO_FEATURE_TOKEN].
#[derive(Debug, PartialEq, Eq)]
pub struct ComposerTokens(Vec<(String, i64)>);

impl ComposerTokens {
    fn new() -> Self {
        Self(
            (0..NUM_COMPOSERS)
                .map(|i| (format!("composer{}", i + 1), FIRST_COMPOSER_TOKEN + i as i64))
                .collect(),
        )
    }

    pub fn get(&self, composer: &str) -> Option<i64> {
        self.0
            .iter()
            .find(|(name, _)| name == composer)
            .map(|(_, token)| *token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(name, token)| (name.as_str(), *token))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ComposerTokens {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, token) in self.iter() {
            map.serialize_entry(name, &token)?;
        }
        map.end()
    }
}

pub(crate) fn composer_to_feature_token() -> &'static ComposerTokens {
    &COMPOSER_TO_FEATURE_TOKEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_one_contiguous_token_per_composer() {
        assert_eq!(COMPOSER_TO_FEATURE_TOKEN.len(), 21);
        for (i, (name, token)) in COMPOSER_TO_FEATURE_TOKEN.iter().enumerate() {
            assert_eq!(name, format!("composer{}", i + 1));
            assert_eq!(token, 2052 + i as i64);
        }
        assert_eq!(COMPOSER_TO_FEATURE_TOKEN.get("composer1"), Some(2052));
        assert_eq!(COMPOSER_TO_FEATURE_TOKEN.get("composer21"), Some(2072));
        assert_eq!(COMPOSER_TO_FEATURE_TOKEN.get("composer22"), None);
        assert_eq!(COMPOSER_TO_FEATURE_TOKEN.get("composer0"), None);
    }

    #[test]
    fn is_shared_by_reference() {
        assert!(std::ptr::eq(
            composer_to_feature_token(),
            composer_to_feature_token()
        ));
    }

    #[test]
    fn serializes_as_object() -> serde_json::Result<()> {
        let value = serde_json::to_value(&*COMPOSER_TO_FEATURE_TOKEN)?;
        let object = value.as_object().expect("expected an object");
        assert_eq!(object.len(), 21);
        assert_eq!(object["composer10"], 2061);
        Ok(())
    }
}
