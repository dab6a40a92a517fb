//! Folder tree in the `files.json` shape: folders are objects, files are
//! `null`.

use serde_json::{Map, Value};

pub fn build_tree<'a>(names: impl IntoIterator<Item = &'a str>) -> Value {
    let mut root = Map::new();

    for name in names {
        let is_folder = name.ends_with('/');
        let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
        let Some((leaf, parents)) = segments.split_last() else {
            continue;
        };

        let mut node = &mut root;
        for parent in parents {
            node = folder_entry(node, parent);
        }

        if is_folder {
            folder_entry(node, leaf);
        } else {
            node.entry(leaf.to_string()).or_insert(Value::Null);
        }
    }

    Value::Object(root)
}

/// A name that is both a file and a folder prefix shows up as a folder.
fn folder_entry<'m>(node: &'m mut Map<String, Value>, name: &str) -> &'m mut Map<String, Value> {
    let slot = node
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just made an object"),
    }
}
