//! Sensitivity classification
//!
//! Classification reads the schema only. It runs before any value is
//! resolved, so a resolution failure can never skip masking.

use std::collections::HashMap;

use crate::schema::{FieldDeclaration, GlobalDefaults, SchemaDocument, Sensitivity};

/// Effective sensitivity of one annotation under a document default
pub fn classify(sensitivity: Sensitivity, default_sensitive: bool) -> bool {
    match sensitivity {
        Sensitivity::Sensitive => true,
        Sensitivity::NotSensitive => false,
        Sensitivity::Inherited => default_sensitive,
    }
}

/// Effective sensitivity of a declared field
pub fn is_sensitive(field: &FieldDeclaration, defaults: &GlobalDefaults) -> bool {
    classify(field.sensitivity, defaults.default_sensitive)
}

/// Effective sensitivity for every field, in declaration order.
///
/// A field whose expression interpolates a sensitive declared field carries
/// that secret in its own value, so it is sensitive too, whatever its own
/// annotation says. This follows references transitively.
pub fn classify_document(doc: &SchemaDocument) -> Vec<bool> {
    let index: HashMap<&str, usize> = doc
        .fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name.as_str(), i))
        .collect();
    let references: Vec<Vec<usize>> = doc
        .fields
        .iter()
        .map(|field| {
            field
                .value
                .references()
                .into_iter()
                .filter_map(|name| index.get(name).copied())
                .collect()
        })
        .collect();

    let mut sensitive: Vec<bool> = doc
        .fields
        .iter()
        .map(|field| is_sensitive(field, &doc.defaults))
        .collect();

    // Terminates: each pass either flips a field to sensitive or stops.
    loop {
        let mut changed = false;
        for (i, refs) in references.iter().enumerate() {
            if !sensitive[i] && refs.iter().any(|&j| sensitive[j]) {
                sensitive[i] = true;
                changed = true;
            }
        }
        if !changed {
            return sensitive;
        }
    }
}
