//! Shared parameter slots.

use crate::error::{ConvertError, Result};
use ndarray::{ArrayD, IxDyn};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A mutable tensor slot. Tied parameters hold the same `Rc`.
pub type ParamSlot = Rc<RefCell<ArrayD<f32>>>;

/// Named parameter slots, ordered by name.
pub type ParamDict = BTreeMap<String, ParamSlot>;

/// Allocate a zero-filled slot of the given shape.
#[must_use]
pub fn new_slot(shape: &[usize]) -> ParamSlot {
    Rc::new(RefCell::new(ArrayD::zeros(IxDyn(shape))))
}

/// Fetch a declared slot.
pub fn slot<'a>(params: &'a ParamDict, name: &str) -> Result<&'a ParamSlot> {
    params.get(name).ok_or_else(|| ConvertError::InvalidInput {
        message: format!("model has no parameter named '{name}'"),
    })
}

/// Prefix every name of `params` and add it to `into`.
pub fn extend_prefixed(into: &mut ParamDict, prefix: &str, params: &ParamDict) {
    for (name, slot) in params {
        into.insert(format!("{prefix}{name}"), Rc::clone(slot));
    }
}

/// Group names that share one slot; each group is sorted.
#[must_use]
pub fn shared_groups(params: &ParamDict) -> Vec<Vec<String>> {
    let mut groups: Vec<(ParamSlot, Vec<String>)> = Vec::new();
    for (name, slot) in params {
        match groups.iter_mut().find(|(s, _)| Rc::ptr_eq(s, slot)) {
            Some((_, names)) => names.push(name.clone()),
            None => groups.push((Rc::clone(slot), vec![name.clone()])),
        }
    }
    groups
        .into_iter()
        .map(|(_, names)| names)
        .filter(|names| names.len() > 1)
        .collect()
}

/// Keep one name per slot, the lexicographically first.
#[must_use]
pub fn deduplicate(params: &ParamDict) -> ParamDict {
    let mut kept: ParamDict = BTreeMap::new();
    for (name, slot) in params {
        if !kept.values().any(|k| Rc::ptr_eq(k, slot)) {
            kept.insert(name.clone(), Rc::clone(slot));
        }
    }
    kept
}
