//! Stored answers for a content test, and the rematch that keeps them aligned
//! with an edited problem.
//!
//! A fixture holds one record per responder of the problem it was built from.
//! Records carry the responder's content fingerprint, so when the problem is
//! edited the stored answers follow the responder they were written for rather
//! than the position it used to occupy.

use crate::fingerprint::{fingerprint, Fingerprint};
use crate::problem::{InputField, ProblemTree, Responder};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Input id -> submitted answer.
pub type AnswerMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRecord {
    pub id: String,
    pub string_id: String,
    pub response_index: usize,
    pub input_index: usize,
    pub answer: String,
}

impl InputRecord {
    fn create(field: &InputField, answer: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            string_id: field.id.clone(),
            response_index: field.response_index,
            input_index: field.input_index,
            answer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderRecord {
    pub id: String,
    pub string_id: String,
    pub fingerprint: Fingerprint,
    pub inputs: Vec<InputRecord>,
}

impl ResponderRecord {
    pub fn create(responder: &Responder, answers: &AnswerMap) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            string_id: responder.id.clone(),
            fingerprint: fingerprint(&responder.xml),
            inputs: responder
                .inputs
                .iter()
                .map(|f| InputRecord::create(f, answers.get(&f.id).cloned().unwrap_or_default()))
                .collect(),
        }
    }

    /// Moves this record onto `responder`, keeping every stored answer.
    /// Callers guarantee the fingerprints are equal, which implies the same
    /// number of inputs in the same order.
    fn rebind(&mut self, responder: &Responder) {
        if self.string_id == responder.id {
            return;
        }
        self.string_id = responder.id.clone();
        for (record, field) in self.inputs.iter_mut().zip(responder.inputs.iter()) {
            record.string_id = field.id.clone();
            record.response_index = field.response_index;
            record.input_index = field.input_index;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fixture {
    pub responders: Vec<ResponderRecord>,
}

impl Fixture {
    /// One record per responder and input of `tree`, answers taken from
    /// `answers` where present.
    pub fn populate(tree: &ProblemTree, answers: &AnswerMap) -> Self {
        Self {
            responders: tree
                .responders
                .iter()
                .map(|r| ResponderRecord::create(r, answers))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.responders.is_empty()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputRecord> {
        self.responders.iter().flat_map(|r| r.inputs.iter())
    }

    /// Overwrites every stored answer; inputs absent from `answers` go blank.
    pub fn apply_answers(&mut self, answers: &AnswerMap) {
        for record in self.responders.iter_mut() {
            for input in record.inputs.iter_mut() {
                input.answer = answers.get(&input.string_id).cloned().unwrap_or_default();
            }
        }
    }

    pub fn answer_map(&self) -> AnswerMap {
        self.inputs()
            .map(|i| (i.string_id.clone(), i.answer.clone()))
            .collect()
    }

    /// True when every stored record still resolves to a responder of
    /// `tree` with the same content.
    pub fn matches(&self, tree: &ProblemTree) -> bool {
        if self.responders.len() != tree.responders.len() {
            return false;
        }
        self.responders.iter().all(|record| {
            match tree.responder_by_id(&record.string_id) {
                Ok(responder) => fingerprint(&responder.xml) == record.fingerprint,
                Err(e) => {
                    tracing::debug!(error = %e, "stored responder no longer present");
                    false
                }
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub fixture: Fixture,
    pub kept: usize,
    pub created: usize,
    /// Records with no counterpart in the new tree; storage deletes them.
    pub dropped: Vec<ResponderRecord>,
}

impl Reconciliation {
    pub fn answer_map(&self) -> AnswerMap {
        self.fixture.answer_map()
    }
}

/// Realigns `old` with `tree` by fingerprint.
///
/// Records whose fingerprint appears in `tree` are moved to the new position
/// with their answers; responders with no stored record get a fresh record
/// with blank answers; everything else is dropped. When several stored
/// records share a fingerprint only the first one can be matched; the rest
/// are dropped along with their answers.
pub fn reconcile(old: Fixture, tree: &ProblemTree) -> Reconciliation {
    let mut dropped = Vec::new();
    let mut by_fingerprint: HashMap<Fingerprint, ResponderRecord> = HashMap::new();
    for record in old.responders {
        match by_fingerprint.entry(record.fingerprint.clone()) {
            Entry::Occupied(_) => dropped.push(record),
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }

    let empty = AnswerMap::new();
    let mut responders = Vec::with_capacity(tree.responders.len());
    let mut kept = 0;
    let mut created = 0;
    for responder in &tree.responders {
        let fp = fingerprint(&responder.xml);
        match by_fingerprint.remove(&fp) {
            Some(mut record) => {
                record.rebind(responder);
                responders.push(record);
                kept += 1;
            }
            None => {
                responders.push(ResponderRecord::create(responder, &empty));
                created += 1;
            }
        }
    }

    let mut leftovers: Vec<ResponderRecord> = by_fingerprint.into_values().collect();
    leftovers.sort_by(|a, b| a.string_id.cmp(&b.string_id));
    dropped.extend(leftovers);

    tracing::debug!(kept, created, dropped = dropped.len(), "fixture reconciled");

    Reconciliation {
        fixture: Fixture { responders },
        kept,
        created,
        dropped,
    }
}
