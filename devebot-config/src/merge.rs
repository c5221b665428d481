//! Non-destructive deep merge of JSON trees.

use serde_json::Value;

/// Fills keys missing from `target` with values from `source`, recursing into
/// objects present on both sides.
///
/// Keys already in `target` win, including `null`. Arrays and scalars are
/// atomic: an existing array is never merged element-wise.
pub fn defaults_deep(target: &mut Value, source: &Value) {
    let (Value::Object(target), Value::Object(source)) = (target, source) else {
        return;
    };
    for (key, fallback) in source {
        match target.get_mut(key) {
            Some(existing) => defaults_deep(existing, fallback),
            None => {
                target.insert(key.clone(), fallback.clone());
            }
        }
    }
}

/// Folds `sources` into `target` from left to right; earlier sources win.
pub fn defaults_deep_all<'a, I>(target: &mut Value, sources: I)
where
    I: IntoIterator<Item = &'a Value>,
{
    for source in sources {
        defaults_deep(target, source);
    }
}

/// Returns the sub-tree at `path`, if every segment exists.
#[must_use]
pub fn pick<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |node, segment| node.get(segment.as_ref()))
}
