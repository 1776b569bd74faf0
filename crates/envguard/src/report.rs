//! Validation reports
//!
//! A report is built fresh for every invocation and never persisted. Each
//! field's sensitivity is fixed from the schema before its value is
//! wrapped, so every value inside a report is already guarded.

use crate::error::{FieldError, ResolutionError, ValidationError};
use crate::resolve::Resolution;
use crate::schema::{FieldDeclaration, SchemaDocument};
use crate::sensitive::{Disclosed, Guarded};
use crate::validate::{validate_field, TypedValue};

/// One field after resolution and validation
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub declaration: FieldDeclaration,
    /// Computed from the schema alone
    pub effective_sensitivity: bool,
    pub required: bool,
    raw: Option<Guarded<String>>,
    validated: Option<Guarded<TypedValue>>,
    error: Option<FieldError>,
}

impl ResolvedField {
    /// Pair a declaration with its resolution and validate it
    pub fn evaluate(
        declaration: FieldDeclaration,
        sensitive: bool,
        required: bool,
        resolution: Resolution,
    ) -> Self {
        let mut field = Self {
            declaration,
            effective_sensitivity: sensitive,
            required,
            raw: None,
            validated: None,
            error: None,
        };

        match resolution {
            Err(e) => field.error = Some(FieldError::Resolution(e)),
            Ok(raw) => {
                let outcome =
                    validate_field(raw.as_deref(), &field.declaration.type_constraint, required);
                field.raw = raw.map(|value| Guarded::new(value, sensitive));
                match outcome {
                    Ok(typed) => field.validated = typed.map(|v| Guarded::new(v, sensitive)),
                    Err(e) => field.error = Some(e),
                }
            }
        }
        field
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&FieldError> {
        self.error.as_ref()
    }

    pub fn resolution_error(&self) -> Option<&ResolutionError> {
        match &self.error {
            Some(FieldError::Resolution(e)) => Some(e),
            _ => None,
        }
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        match &self.error {
            Some(FieldError::Validation(e)) => Some(e),
            _ => None,
        }
    }

    pub fn raw(&self) -> Option<&Guarded<String>> {
        self.raw.as_ref()
    }

    pub fn validated(&self) -> Option<&Guarded<TypedValue>> {
        self.validated.as_ref()
    }

    /// The value as it may appear in output. Sensitive fields always
    /// disclose the mask, even when absent or invalid; absent public fields
    /// disclose `None`.
    pub fn disclose<'a>(&'a self, mask: &'a str) -> Option<Disclosed<'a, String>> {
        if self.effective_sensitivity {
            return Some(Disclosed::Masked(mask));
        }
        self.raw.as_ref().map(|raw| raw.disclose(mask))
    }
}

/// Aggregate result of one load/run invocation
#[derive(Debug, Clone)]
pub struct ValidationReport {
    fields: Vec<ResolvedField>,
}

impl ValidationReport {
    /// Combine a schema with per-field resolutions (declaration order)
    pub fn build(doc: &SchemaDocument, sensitivity: &[bool], resolutions: Vec<Resolution>) -> Self {
        let fields = doc
            .fields
            .iter()
            .zip(sensitivity)
            .zip(resolutions)
            .map(|((decl, &sensitive), resolution)| {
                let required = decl.is_required(&doc.defaults);
                ResolvedField::evaluate(decl.clone(), sensitive, required, resolution)
            })
            .collect();
        Self::from_fields(fields)
    }

    pub fn from_fields(mut fields: Vec<ResolvedField>) -> Self {
        fields.sort_by_key(|f| f.declaration.order);
        Self { fields }
    }

    /// True iff no field has a resolution, validation, or missing-value error
    pub fn ok(&self) -> bool {
        self.fields.iter().all(ResolvedField::is_ok)
    }

    pub fn fields(&self) -> &[ResolvedField] {
        &self.fields
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResolvedField> {
        self.fields.iter().filter(|f| !f.is_ok())
    }

    pub fn error_count(&self) -> usize {
        self.failures().count()
    }

    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Name and error kind per field; equal for equal inputs
    pub fn outline(&self) -> Vec<(String, Option<&'static str>)> {
        self.fields
            .iter()
            .map(|f| (f.name().to_string(), f.error().map(FieldError::kind)))
            .collect()
    }
}

/// Whether any sensitive raw value appears in `output`
#[cfg(test)]
pub(crate) fn leaks_any_secret(report: &ValidationReport, output: &str) -> bool {
    use secrecy::ExposeSecret;

    report
        .fields()
        .iter()
        .filter(|f| f.effective_sensitivity)
        .filter_map(|f| f.raw())
        .any(|raw| !raw.expose_secret().is_empty() && output.contains(raw.expose_secret().as_str()))
}
