//! Output rendering for `fq`.
//!
//! Plain mode prints one line per item in query-language syntax; JSON mode
//! prints an array of objects with the ref, content, and visible facts.

use factdb_core::Item;

/// Prints a response list in the selected mode.
pub fn print_items(items: &[Item], json: bool) {
    if json {
        let rendered: Vec<serde_json::Value> = items.iter().map(item_to_json).collect();
        match serde_json::to_string_pretty(&rendered) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Error: failed to render JSON: {e}"),
        }
        return;
    }

    for item in items {
        println!("{item}");
    }
}

/// A stable JSON shape for one item.
fn item_to_json(item: &Item) -> serde_json::Value {
    let facts: Vec<serde_json::Value> = item
        .facts()
        .map(|f| {
            serde_json::json!({
                "tag": f.tag,
                "prop": f.prop,
                "value": f.value,
            })
        })
        .collect();

    serde_json::json!({
        "ref": item.ref_value(),
        "content": item.content_text(),
        "facts": facts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use factdb_core::Fact;

    #[test]
    fn json_shape_has_ref_content_facts() {
        let item = Item::new([
            Fact::primary_ref("3dd"),
            Fact::content("hello"),
            Fact::tag("todo"),
        ]);
        let value = item_to_json(&item);
        assert_eq!(value["ref"], "3dd");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["facts"].as_array().unwrap().len(), 3);
    }
}
