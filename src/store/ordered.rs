use serde::de::{DeserializeOwned, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// A keyed collection that remembers insertion order.
///
/// Lookup is O(1) through the index map; iteration walks the key list in the
/// order entries were first inserted. Replacing an existing key keeps its
/// original position. Serialized as an array of `[id, record]` pairs so the
/// on-disk file reloads into the exact same order.
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    keys: Vec<K>,
    entries: HashMap<K, V>,
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            entries: HashMap::new(),
        }
    }
}

impl<K, V> OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces. A replaced entry keeps its position; a new entry
    /// goes to the end. Returns the previous value if there was one.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.entries.insert(key.clone(), value);
        if previous.is_none() {
            self.keys.push(key);
        }
        previous
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.keys.retain(|k| k != key);
        }
        removed
    }

    /// Removes every entry the predicate rejects, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        let entries = &mut self.entries;
        self.keys.retain(|k| {
            let keep_it = entries
                .get(k)
                .map(|v| keep(k, v))
                .unwrap_or(false);
            if !keep_it {
                entries.remove(k);
            }
            keep_it
        });
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys
            .iter()
            .filter_map(move |k| self.entries.get(k).map(|v| (k, v)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}

impl<K, V> Serialize for OrderedMap<K, V>
where
    K: Eq + Hash + Clone + Serialize,
    V: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for pair in self.iter() {
            seq.serialize_element(&pair)?;
        }
        seq.end()
    }
}

impl<'de, K, V> Deserialize<'de> for OrderedMap<K, V>
where
    K: Eq + Hash + Clone + DeserializeOwned,
    V: DeserializeOwned,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PairListVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for PairListVisitor<K, V>
        where
            K: Eq + Hash + Clone + DeserializeOwned,
            V: DeserializeOwned,
        {
            type Value = OrderedMap<K, V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array of [id, record] pairs")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut map = OrderedMap::new();
                while let Some((key, value)) = seq.next_element::<(K, V)>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_seq(PairListVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_preserves_order_and_replace_keeps_position() {
        let mut map = OrderedMap::new();
        map.insert(3, "c");
        map.insert(1, "a");
        map.insert(2, "b");
        map.insert(1, "a2");

        let keys: Vec<i64> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![3, 1, 2]);
        assert_eq!(map.get(&1), Some(&"a2"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn remove_drops_key_from_iteration() {
        let mut map = OrderedMap::new();
        map.insert("x".to_string(), 1);
        map.insert("y".to_string(), 2);
        map.insert("z".to_string(), 3);

        assert_eq!(map.remove(&"y".to_string()), Some(2));
        assert_eq!(map.remove(&"y".to_string()), None);

        let keys: Vec<String> = map.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["x".to_string(), "z".to_string()]);
    }

    #[test]
    fn retain_filters_in_order() {
        let mut map = OrderedMap::new();
        for n in 1..=5 {
            map.insert(n, n * 10);
        }
        map.retain(|_, v| v % 20 == 0);

        let values: Vec<i64> = map.values().copied().collect();
        assert_eq!(values, vec![20, 40]);
    }

    #[test]
    fn serde_round_trip_keeps_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert(5, "five".to_string());
        map.insert(2, "two".to_string());
        map.insert(9, "nine".to_string());

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"[[5,"five"],[2,"two"],[9,"nine"]]"#);

        let reloaded: OrderedMap<i64, String> = serde_json::from_str(&json).unwrap();
        let keys: Vec<i64> = reloaded.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![5, 2, 9]);
    }
}
