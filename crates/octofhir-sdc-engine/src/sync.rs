//! Response tree synchroniser
//!
//! Merges a changed item into its parent's child list while keeping the
//! children a strict order-preserving subsequence of the questionnaire's
//! declared item order. Conditionally hidden items are simply absent, so
//! the right position for a (re)appearing child is found by comparing
//! declared positions, not by storing order separately.
//!
//! Guarantees after any merge:
//! - children appear in questionnaire order
//! - no duplicate linkIds at one level
//! - no item with neither answer nor children survives

use indexmap::IndexMap;
use log::warn;

use octofhir_sdc_model::{QuestionnaireResponse, QuestionnaireResponseItem};

/// Merge `new_child` into `children` using the parent's declared position
/// map.
///
/// A child whose linkId is not in the map belongs to a different (older)
/// questionnaire version: it is dropped with a warning, never an error.
pub fn merge_child(
    children: &mut Vec<QuestionnaireResponseItem>,
    new_child: QuestionnaireResponseItem,
    positions: &IndexMap<String, usize>,
) {
    let Some(&new_position) = positions.get(&new_child.link_id) else {
        warn!(
            "dropping response item with unknown linkId {}",
            new_child.link_id
        );
        return;
    };
    let is_empty = new_child.is_empty();

    if children.is_empty() {
        if !is_empty {
            children.push(new_child);
        }
        return;
    }

    for i in 0..children.len() {
        // An existing child unknown to this questionnaire version sorts
        // last so the new child lands before it
        let existing_position = positions
            .get(&children[i].link_id)
            .copied()
            .unwrap_or(usize::MAX);

        if new_position > existing_position {
            if i == children.len() - 1 {
                if !is_empty {
                    children.push(new_child);
                }
                return;
            }
            continue;
        }

        if new_position == existing_position {
            if is_empty {
                children.remove(i);
            } else {
                children[i] = new_child;
            }
            return;
        }

        // new_position < existing_position: splice in before
        if !is_empty {
            children.insert(i, new_child);
        }
        return;
    }
}

/// Remove every answer-less, child-less item from the tree, bottom-up
pub fn prune_empty(response: &mut QuestionnaireResponse) {
    prune_items(&mut response.item);
}

fn prune_items(items: &mut Vec<QuestionnaireResponseItem>) {
    for item in items.iter_mut() {
        prune_items(&mut item.item);
        for answer in &mut item.answer {
            prune_items(&mut answer.item);
        }
    }
    items.retain(|item| !item.is_empty());
}

/// Find a mutable reference to the item with `link_id` at any depth
pub fn find_item_mut<'a>(
    items: &'a mut [QuestionnaireResponseItem],
    link_id: &str,
) -> Option<&'a mut QuestionnaireResponseItem> {
    for item in items {
        if item.link_id == link_id {
            return Some(item);
        }
        if let Some(found) = find_item_mut(&mut item.item, link_id) {
            return Some(found);
        }
    }
    None
}

/// Find the item with `link_id` at any depth
pub fn find_item<'a>(
    items: &'a [QuestionnaireResponseItem],
    link_id: &str,
) -> Option<&'a QuestionnaireResponseItem> {
    for item in items {
        if item.link_id == link_id {
            return Some(item);
        }
        if let Some(found) = find_item(&item.item, link_id) {
            return Some(found);
        }
        for answer in &item.answer {
            if let Some(found) = find_item(&answer.item, link_id) {
                return Some(found);
            }
        }
    }
    None
}
