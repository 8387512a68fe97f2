use tr_core::TrValue;

pub(crate) fn parse_ref_path(path: &str) -> Vec<String> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Walks map keys and array indices below `root`.
pub(crate) fn read_nested_path<'a>(root: &'a TrValue, path: &[String]) -> Option<&'a TrValue> {
    let Some(head) = path.first() else {
        return Some(root);
    };

    let next = match root {
        TrValue::Map(entries) => entries.get(head)?,
        TrValue::Array(values) => values.get(head.parse::<usize>().ok()?)?,
        _ => return None,
    };
    read_nested_path(next, &path[1..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn parse_ref_path_drops_empty_segments() {
        assert_eq!(parse_ref_path(" a . b..c "), vec!["a", "b", "c"]);
        assert!(parse_ref_path("").is_empty());
    }

    #[test]
    fn read_nested_path_descends_maps_and_arrays() {
        let mut inner = BTreeMap::new();
        inner.insert(
            "items".to_string(),
            TrValue::Array(vec![TrValue::from("zero"), TrValue::from("one")]),
        );
        let root = TrValue::Map(BTreeMap::from([("user".to_string(), TrValue::Map(inner))]));

        assert_eq!(
            read_nested_path(&root, &parse_ref_path("user.items.1")),
            Some(&TrValue::from("one"))
        );
        assert!(read_nested_path(&root, &parse_ref_path("user.items.9")).is_none());
        assert!(read_nested_path(&root, &parse_ref_path("user.name")).is_none());
        assert_eq!(read_nested_path(&root, &[]), Some(&root));
    }
}
