//! Value resolution
//!
//! Fields reference each other through `${NAME}` interpolation. The plan
//! groups fields into levels: every field depends only on fields from
//! earlier levels. Fields within a level are resolved concurrently, each
//! against an immutable snapshot of the earlier results, and results are
//! merged only after the whole level finishes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::classify::classify_document;
use crate::error::{ResolutionError, SchemaError};
use crate::expr::{Template, ValueExpression};
use crate::plugins::{ResolveContext, ResolverRegistry};
use crate::schema::SchemaDocument;

/// Result of resolving one field: a value, no value, or an error
pub type Resolution = Result<Option<String>, ResolutionError>;

/// Dependency-ordered resolution schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// Field indices grouped by level, in declaration order within a level
    pub levels: Vec<Vec<usize>>,
    /// Declared fields each field interpolates, by index
    pub dependencies: Vec<Vec<usize>>,
}

impl ResolutionPlan {
    /// Build the schedule, failing on any interpolation cycle
    pub fn build(doc: &SchemaDocument) -> Result<Self, SchemaError> {
        let index: HashMap<&str, usize> = doc
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), i))
            .collect();

        let dependencies: Vec<Vec<usize>> = doc
            .fields
            .iter()
            .map(|field| {
                let deps: BTreeSet<usize> = field
                    .value
                    .references()
                    .into_iter()
                    .filter_map(|name| index.get(name).copied())
                    .collect();
                deps.into_iter().collect()
            })
            .collect();

        let n = doc.fields.len();
        let mut level_of: Vec<Option<usize>> = vec![None; n];
        let mut levels: Vec<Vec<usize>> = Vec::new();
        let mut placed = 0;

        while placed < n {
            let ready: Vec<usize> = (0..n)
                .filter(|&i| level_of[i].is_none())
                .filter(|&i| {
                    dependencies[i]
                        .iter()
                        .all(|&d| level_of[d].is_some_and(|l| l < levels.len()))
                })
                .collect();

            if ready.is_empty() {
                let stuck: Vec<usize> = (0..n).filter(|&i| level_of[i].is_none()).collect();
                return Err(SchemaError::DependencyCycle(find_cycle(
                    doc,
                    &dependencies,
                    &stuck,
                )));
            }

            for &i in &ready {
                level_of[i] = Some(levels.len());
            }
            placed += ready.len();
            levels.push(ready);
        }

        Ok(Self {
            levels,
            dependencies,
        })
    }
}

/// Walk dependencies among unplaceable fields until a node repeats
fn find_cycle(doc: &SchemaDocument, dependencies: &[Vec<usize>], stuck: &[usize]) -> Vec<String> {
    let mut path: Vec<usize> = Vec::new();
    let mut current = stuck[0];
    loop {
        if let Some(pos) = path.iter().position(|&i| i == current) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|&i| doc.fields[i].name.clone())
                .collect();
            cycle.push(doc.fields[current].name.clone());
            return cycle;
        }
        path.push(current);
        // Every stuck field has at least one stuck dependency.
        current = match dependencies[current].iter().find(|d| stuck.contains(d)) {
            Some(&next) => next,
            None => return path.iter().map(|&i| doc.fields[i].name.clone()).collect(),
        };
    }
}

/// Options controlling resolution
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub max_concurrency: usize,
    /// Let a present process environment variable win over a literal
    pub process_env_overrides: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            process_env_overrides: false,
        }
    }
}

/// Resolve every field of `doc` following `plan`.
///
/// Returns one [`Resolution`] per field, in declaration order.
pub async fn resolve_all(
    doc: &SchemaDocument,
    plan: &ResolutionPlan,
    registry: Arc<ResolverRegistry>,
    ctx: &ResolveContext,
    options: &ResolveOptions,
) -> Vec<Resolution> {
    let mut results: Vec<Option<Resolution>> = vec![None; doc.fields.len()];
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let sensitivity = classify_document(doc);

    for (level_no, level) in plan.levels.iter().enumerate() {
        debug!(level = level_no, fields = level.len(), "resolving level");

        // Earlier results, keyed by name, frozen for this level.
        let snapshot: Arc<HashMap<String, Resolution>> = Arc::new(
            results
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.clone().map(|r| (doc.fields[i].name.clone(), r)))
                .collect(),
        );

        let mut handles = Vec::with_capacity(level.len());
        for &i in level {
            let field = &doc.fields[i];
            // Sensitive inputs, so their values can be kept out of error text.
            let secrets = plan.dependencies[i]
                .iter()
                .filter(|&&d| sensitivity[d])
                .map(|&d| doc.fields[d].name.clone())
                .collect();
            let task = FieldTask {
                name: field.name.clone(),
                secrets,
                value: field.value.clone(),
                resolved: Arc::clone(&snapshot),
                registry: Arc::clone(&registry),
                ctx: ctx.clone(),
                process_env_overrides: options.process_env_overrides,
            };
            let semaphore = Arc::clone(&semaphore);
            handles.push((
                i,
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    task.run().await
                }),
            ));
        }

        for (i, handle) in handles {
            let resolution = match handle.await {
                Ok(resolution) => resolution,
                Err(e) => {
                    warn!(field = %doc.fields[i].name, "resolver task failed");
                    Err(ResolutionError::Plugin {
                        kind: "internal".to_string(),
                        message: if e.is_panic() {
                            "resolver panicked".to_string()
                        } else {
                            "resolver task was cancelled".to_string()
                        },
                    })
                }
            };
            results[i] = Some(resolution);
        }
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or(Ok(None)))
        .collect()
}

struct FieldTask {
    name: String,
    secrets: Vec<String>,
    value: ValueExpression,
    resolved: Arc<HashMap<String, Resolution>>,
    registry: Arc<ResolverRegistry>,
    ctx: ResolveContext,
    process_env_overrides: bool,
}

impl FieldTask {
    async fn run(self) -> Resolution {
        match &self.value {
            ValueExpression::Empty => Ok(self.ctx.env.get(&self.name).cloned()),
            ValueExpression::Literal(template) => {
                if self.process_env_overrides {
                    if let Some(value) = self.ctx.env.get(&self.name) {
                        return Ok(Some(value.clone()));
                    }
                }
                self.interpolate(template).map(Some)
            }
            ValueExpression::Call { kind, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.interpolate(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                debug!(field = %self.name, kind = %kind, "calling resolver");
                self.registry
                    .resolve(kind, &args, &self.ctx)
                    .await
                    .map_err(|e| self.scrub(e))
            }
        }
    }

    /// Swap interpolated secret values in an error for their `${NAME}` source
    fn scrub(&self, mut err: ResolutionError) -> ResolutionError {
        for name in &self.secrets {
            if let Some(Ok(Some(value))) = self.resolved.get(name) {
                err = err.scrub(value, &format!("${{{}}}", name));
            }
        }
        err
    }

    /// Declared fields win over the process environment
    fn interpolate(&self, template: &Template) -> Result<String, ResolutionError> {
        template.render(|name| match self.resolved.get(name) {
            Some(Ok(Some(value))) if !value.is_empty() => Ok(value.clone()),
            Some(Ok(_)) => Err(ResolutionError::UnsetReference(name.to_string())),
            Some(Err(_)) => Err(ResolutionError::DependencyFailed(name.to_string())),
            None => self
                .ctx
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| ResolutionError::UnsetReference(name.to_string())),
        })
    }
}
