//! Helpers over JSON values and collections

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

pub use serde_json::{Map, Value};

use crate::common::{Result, UtilError};

/// One dotted path segment, e.g. `items[2]`
struct Segment<'a> {
    key: &'a str,
    index: Option<Option<i64>>,
}

fn parse_segment(segment: &str) -> Result<Segment<'_>> {
    let invalid = || UtilError::InvalidPath(format!("invalid key: {}", segment));

    let Some(open) = segment.find('[') else {
        if segment.contains(']') {
            return Err(invalid());
        }
        return Ok(Segment {
            key: segment,
            index: None,
        });
    };
    let close = segment.find(']').ok_or_else(invalid)?;
    if open > close {
        return Err(invalid());
    }

    Ok(Segment {
        key: &segment[..open],
        index: Some(segment[open + 1..close].trim().parse::<i64>().ok()),
    })
}

/// Resolve one segment; `None` means the default applies
fn lookup<'a>(data: &'a Value, segment: &Segment<'_>) -> Result<Option<&'a Value>> {
    let Some(index) = segment.index else {
        return Ok(data.as_object().and_then(|map| map.get(segment.key)));
    };
    let Some(index) = index else {
        return Ok(None);
    };

    // `[0].a` indexes the value itself
    let list = if segment.key.is_empty() {
        data
    } else {
        match data.as_object().and_then(|map| map.get(segment.key)) {
            Some(list) => list,
            None => return Ok(None),
        }
    };

    match list {
        Value::Null => Ok(None),
        Value::Array(items) => {
            let position = if index < 0 {
                items.len() as i64 + index
            } else {
                index
            };
            Ok(usize::try_from(position).ok().and_then(|i| items.get(i)))
        }
        _ => Err(UtilError::InvalidPath(format!(
            "invalid key (should be list): {}",
            segment.key
        ))),
    }
}

/// Get a nested value by dotted path with optional `[i]` indexes
///
/// Negative indexes count from the end. A missing key, an out of range index
/// or a non-object along the way yields `default`; a key whose value is
/// `null` yields `null`.
///
/// # Errors
///
/// [`UtilError::InvalidPath`] for unbalanced brackets and for indexing a
/// value that is not a list.
///
/// ```
/// # use serde_json::json;
/// # use utilkit::data::pget;
/// let data = json!({"a": {"b": [{"c": 1}, {"c": 2}]}});
/// assert_eq!(pget(&data, "a.b[-1].c", json!(null)).unwrap(), json!(2));
/// assert_eq!(pget(&data, "a.x", json!("n/a")).unwrap(), json!("n/a"));
/// ```
pub fn pget(data: &Value, path: &str, default: Value) -> Result<Value> {
    let segments = path
        .split('.')
        .map(parse_segment)
        .collect::<Result<Vec<_>>>()?;

    let mut current = data;
    for segment in &segments {
        match lookup(current, segment)? {
            Some(next) => current = next,
            None => return Ok(default),
        }
    }
    Ok(current.clone())
}

/// Flatten nested arrays into one list of leaves
pub fn flatten(value: &Value) -> Vec<Value> {
    let mut leaves = Vec::new();
    collect_leaves(value, &mut leaves);
    leaves
}

fn collect_leaves(value: &Value, leaves: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_leaves(item, leaves)),
        leaf => leaves.push(leaf.clone()),
    }
}

/// Map each key to itself
pub fn kvdict<I, S>(keys: I) -> Map<String, Value>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter()
        .map(|key| {
            let key = key.into();
            (key.clone(), Value::String(key))
        })
        .collect()
}

#[doc(hidden)]
pub fn __to_value<T: serde::Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Build a JSON object keyed by variable names
///
/// ```
/// # use utilkit::kdict;
/// let a = 1;
/// let b = "two";
/// let map = kdict!(a, b);
/// assert_eq!(map["a"], 1);
/// assert_eq!(map["b"], "two");
/// ```
#[macro_export]
macro_rules! kdict {
    ($($name:ident),* $(,)?) => {{
        let mut map = $crate::data::Map::new();
        $(
            map.insert(stringify!($name).to_string(), $crate::data::__to_value(&$name));
        )*
        map
    }};
}

/// Deduplicate by `key`; among items sharing a key the last one wins
pub fn set_with_key<I, T, K, F>(items: I, key: F) -> HashSet<T>
where
    I: IntoIterator<Item = T>,
    T: Eq + Hash,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut by_key = HashMap::new();
    for item in items {
        by_key.insert(key(&item), item);
    }
    by_key.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "a": {
                "b": {
                    "c": 1,
                    "d": [{"e": 1}, {"f": 2}],
                    "g": null
                }
            }
        })
    }

    #[test]
    fn test_pget_found() {
        let data = sample();
        assert_eq!(pget(&data, "a.b.c", json!("n/a")).unwrap(), json!(1));
        assert_eq!(pget(&data, "a.b.d[0].e", json!(null)).unwrap(), json!(1));
        assert_eq!(pget(&data, "a.b.d[1].f", json!(null)).unwrap(), json!(2));
        assert_eq!(pget(&data, "a.b.d[-1].f", json!(null)).unwrap(), json!(2));
        assert_eq!(pget(&data, "a.b.g", json!("n/a")).unwrap(), json!(null));
        assert_eq!(pget(&json!([{"a": 1}]), "[0].a", json!(null)).unwrap(), json!(1));
    }

    #[test]
    fn test_pget_default() {
        let data = sample();
        assert_eq!(pget(&data, "a.b.e", json!(12)).unwrap(), json!(12));
        assert_eq!(pget(&data, "a.b.d[2].f", json!("n/a")).unwrap(), json!("n/a"));
        assert_eq!(pget(&data, "a.b.g[1]", json!("n/a")).unwrap(), json!("n/a"));
        assert_eq!(pget(&data, "a.x.y.z", json!(0)).unwrap(), json!(0));
        assert_eq!(pget(&data, "a.b.c.d", json!(0)).unwrap(), json!(0));
        assert_eq!(pget(&data, "a.b.d[x]", json!(0)).unwrap(), json!(0));
    }

    #[test]
    fn test_pget_invalid_path() {
        let data = sample();
        for path in ["a.b.d[2.f", "a.b.d2].f", "a.b.][d2.f", "a.b.c[0]"] {
            assert!(
                matches!(pget(&data, path, json!(null)), Err(UtilError::InvalidPath(_))),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_flatten() {
        let nested = json!([1, [2, [3, [4]]], "x", []]);
        assert_eq!(flatten(&nested), vec![json!(1), json!(2), json!(3), json!(4), json!("x")]);
        assert_eq!(flatten(&json!(5)), vec![json!(5)]);
    }

    #[test]
    fn test_kvdict_and_kdict() {
        let map = kvdict(["a", "b"]);
        assert_eq!(map["a"], json!("a"));
        assert_eq!(map.len(), 2);

        let count = 3;
        let names = vec!["x", "y"];
        let map = crate::kdict!(count, names);
        assert_eq!(Value::Object(map), json!({"count": 3, "names": ["x", "y"]}));
    }

    #[test]
    fn test_set_with_key() {
        let set = set_with_key(vec!["hello", "world", "shanghai"], |s| s.len());
        assert_eq!(set, HashSet::from(["world", "shanghai"]));

        let set = set_with_key(vec!["hey", "world", "shanghai"], |s| s.len());
        assert_eq!(set.len(), 3);
    }
}
