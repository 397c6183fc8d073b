use std::fmt;

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

pub const NUM_DISCRIMINATOR_TRAIN_EXAMPLES: &str = "num_discriminator_train_examples";
pub const NUM_GENERATOR_TRAIN_EXAMPLES: &str = "num_generator_train_examples";
pub const NUM_ROUNDS: &str = "num_rounds";

/// Named training counters kept in insertion order.
///
/// The order only matters for logging and serialization, which both follow it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    entries: Vec<(String, u64)>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries
            .iter()
            .find_map(|(k, v)| (k == name).then_some(*v))
    }

    /// Adds `amount` to `name`, appending the counter if it doesn't exist yet.
    pub fn add(&mut self, name: &str, amount: u64) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = v.saturating_add(amount),
            None => self.entries.push((name.to_string(), amount)),
        }
    }

    /// Sums every counter of `other` into `self`.
    pub fn merge(&mut self, other: &Counters) {
        for (name, amount) in other.iter() {
            self.add(name, amount);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for Counters {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut counters = Self::new();
        for (name, amount) in iter {
            counters.add(&name.into(), amount);
        }
        counters
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl Serialize for Counters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Counters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountersVisitor;

        impl<'de> Visitor<'de> for CountersVisitor {
            type Value = Counters;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of counter names to non-negative integers")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Counters, M::Error> {
                let mut counters = Counters::new();
                while let Some((name, value)) = access.next_entry::<String, u64>()? {
                    counters.add(&name, value);
                }
                Ok(counters)
            }
        }

        deserializer.deserialize_map(CountersVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_creates_then_accumulates() {
        let mut counters = Counters::new();
        counters.add("a", 2);
        counters.add("b", 1);
        counters.add("a", 3);

        assert_eq!(counters.get("a"), Some(5));
        assert_eq!(counters.get("b"), Some(1));
        assert_eq!(counters.get("c"), None);
        assert_eq!(counters.len(), 2);
    }

    #[test]
    fn merge_keeps_existing_order_and_appends_new_names() {
        let mut counters: Counters = [("x", 1), ("y", 2)].into_iter().collect();
        let other: Counters = [("z", 7), ("x", 4)].into_iter().collect();

        counters.merge(&other);

        let entries: Vec<_> = counters.iter().collect();
        assert_eq!(entries, [("x", 5), ("y", 2), ("z", 7)]);
    }

    #[test]
    fn serializes_in_insertion_order() {
        let counters: Counters = [(NUM_ROUNDS, 3), (NUM_DISCRIMINATOR_TRAIN_EXAMPLES, 10)]
            .into_iter()
            .collect();

        let json = serde_json::to_string(&counters).unwrap();
        assert_eq!(json, r#"{"num_rounds":3,"num_discriminator_train_examples":10}"#);

        let back: Counters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, counters);
    }

    #[test]
    fn display() {
        let counters: Counters = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(counters.to_string(), "a=1, b=2");
    }
}
