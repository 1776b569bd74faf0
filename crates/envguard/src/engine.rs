//! Orchestration: parse, plan, classify, resolve, validate
//!
//! One [`Engine::evaluate`] call is one unit of work. Nothing is cached
//! between calls, so re-running on unchanged inputs yields an equal report.

use anyhow::{bail, Context, Result};
use envguard_core::{paths, Config, Paths};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::classify::classify_document;
use crate::error::SchemaError;
use crate::plugins::{ResolveContext, ResolverRegistry};
use crate::report::ValidationReport;
use crate::resolve::{resolve_all, ResolutionPlan, ResolveOptions};
use crate::schema::SchemaDocument;

/// Variable carrying the selected overlay name into interpolation
pub const ENV_NAME_VAR: &str = "ENVGUARD_ENV";

pub struct Engine {
    config: Config,
    registry: Arc<ResolverRegistry>,
    env: HashMap<String, String>,
}

impl Engine {
    /// Built-in resolvers plus configured aliases, over the process environment
    pub fn new(config: Config) -> Self {
        let registry = ResolverRegistry::with_builtins().with_aliases(&config.resolvers);
        Self {
            config,
            registry: Arc::new(registry),
            env: std::env::vars().collect(),
        }
    }

    /// Replace the environment snapshot
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_registry(mut self, registry: ResolverRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Read and parse a schema, applying the `.env.<name>` overlay if selected
    pub fn load_schema(&self, path: &Path, env_name: Option<&str>) -> Result<SchemaDocument> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema {:?}", path))?;
        let mut doc = SchemaDocument::parse(&text)
            .with_context(|| format!("Invalid schema {:?}", path))?;

        if let Some(name) = env_name {
            let overlay = Paths::overlay(path, name);
            if !overlay.exists() {
                bail!("No overlay for environment '{}' (expected {:?})", name, overlay);
            }
            let text = std::fs::read_to_string(&overlay)
                .with_context(|| format!("Failed to read overlay {:?}", overlay))?;
            doc.apply_overlay(&text)
                .with_context(|| format!("Invalid overlay {:?}", overlay))?;
            debug!(env = name, fields = doc.len(), "applied overlay");
        }

        Ok(doc)
    }

    /// Resolve and validate every field of `doc`.
    ///
    /// Fails only for a dependency cycle; per-field problems land in the report.
    pub async fn evaluate(
        &self,
        doc: &SchemaDocument,
        schema_path: &Path,
        env_name: Option<&str>,
    ) -> Result<ValidationReport, SchemaError> {
        let plan = ResolutionPlan::build(doc)?;
        // Sensitivity is settled before any value exists.
        let sensitivity = classify_document(doc);

        let mut env = self.env.clone();
        if let Some(name) = env_name {
            env.insert(ENV_NAME_VAR.to_string(), name.to_string());
        }
        let ctx = ResolveContext::new(
            env,
            Duration::from_secs(self.config.resolver_timeout_secs),
            paths::schema_dir(schema_path),
        );
        let options = ResolveOptions {
            max_concurrency: self.config.max_concurrency,
            process_env_overrides: self.config.process_env_overrides,
        };

        let started = Instant::now();
        let resolutions =
            resolve_all(doc, &plan, Arc::clone(&self.registry), &ctx, &options).await;
        let report = ValidationReport::build(doc, &sensitivity, resolutions);

        info!(
            fields = report.fields().len(),
            errors = report.error_count(),
            levels = plan.levels.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "evaluated schema"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use crate::error::{FieldError, ResolutionError, Violation};
    use crate::render::{render, OutputFormat, RenderOptions};
    use crate::report::leaks_any_secret;
    use crate::validate::TypedValue;
    use std::fs;
    use tempfile::TempDir;

    const SCHEMA: &str = "\
# @defaultSensitive=true
# @type=enum(dev,staging,prod) @sensitive=false
NODE_ENV=dev
# Primary database password
# @type=string @required @sensitive
DATABASE_PASSWORD=
";

    fn engine(env: &[(&str, &str)]) -> Engine {
        let env = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Engine::new(Config::default()).with_env(env)
    }

    fn write_schema(dir: &TempDir, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(".env.schema");
        fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_required_secret() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(&dir, SCHEMA);
        let engine = engine(&[]);
        let doc = engine.load_schema(&path, None).unwrap();
        let report = engine.evaluate(&doc, &path, None).await.unwrap();

        assert!(!report.ok());
        let node_env = report.field("NODE_ENV").unwrap();
        assert!(node_env.is_ok());
        assert!(!node_env.effective_sensitivity);
        let password = report.field("DATABASE_PASSWORD").unwrap();
        assert_eq!(password.error(), Some(&FieldError::MissingRequired));

        let out = render(&report, &RenderOptions::default());
        assert!(out.contains("NODE_ENV: dev"));
        assert!(out.contains("DATABASE_PASSWORD: ********"));
    }

    #[tokio::test]
    async fn test_secret_from_environment_stays_masked() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(&dir, SCHEMA);
        let engine = engine(&[("DATABASE_PASSWORD", "hunter2-very-secret")]);
        let doc = engine.load_schema(&path, None).unwrap();
        let report = engine.evaluate(&doc, &path, None).await.unwrap();

        assert!(report.ok());
        let out = render(&report, &RenderOptions::default());
        assert!(!out.contains("hunter2-very-secret"));
        assert!(!leaks_any_secret(&report, &out));
    }

    #[tokio::test]
    async fn test_public_field_built_from_secret_is_masked() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(
            &dir,
            "# @sensitive\nDB_PASSWORD=\n\
             # @sensitive=false\nDATABASE_URL=\"postgres://app:${DB_PASSWORD}@db:5432/app\"\n",
        );
        let engine = engine(&[("DB_PASSWORD", "hunter2-top-secret")]);
        let doc = engine.load_schema(&path, None).unwrap();
        let report = engine.evaluate(&doc, &path, None).await.unwrap();

        assert!(report.ok());
        assert!(report.field("DATABASE_URL").unwrap().effective_sensitivity);
        for quiet in [false, true] {
            for format in [OutputFormat::Text, OutputFormat::Json] {
                let opts = RenderOptions {
                    quiet,
                    format,
                    ..RenderOptions::default()
                };
                let out = render(&report, &opts);
                assert!(!out.contains("hunter2-top-secret"), "{}", out);
                assert!(!leaks_any_secret(&report, &out));
            }
        }
        let out = render(&report, &RenderOptions::default());
        assert!(out.contains("DATABASE_URL: ******** (sensitive)"));
    }

    #[tokio::test]
    async fn test_secret_program_name_not_rendered() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(
            &dir,
            "SECRET_CMD=\n# @sensitive=false @required=false\nTOKEN=exec(${SECRET_CMD})\n",
        );
        let engine = engine(&[("SECRET_CMD", "envguard-hidden-cmd-91c2")]);
        let doc = engine.load_schema(&path, None).unwrap();
        let report = engine.evaluate(&doc, &path, None).await.unwrap();

        let token = report.field("TOKEN").unwrap();
        assert_eq!(token.error().unwrap().kind(), "ResolutionError");
        for format in [OutputFormat::Text, OutputFormat::Json] {
            let opts = RenderOptions {
                format,
                ..RenderOptions::default()
            };
            let out = render(&report, &opts);
            assert!(!out.contains("envguard-hidden-cmd-91c2"), "{}", out);
            assert!(out.contains("${SECRET_CMD}"));
        }
    }

    #[tokio::test]
    async fn test_port_out_of_range() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(&dir, "# @type=port @sensitive=false\nPORT=70000\n");
        let engine = engine(&[]);
        let doc = engine.load_schema(&path, None).unwrap();
        let report = engine.evaluate(&doc, &path, None).await.unwrap();
        let port = report.field("PORT").unwrap();
        assert_eq!(
            port.validation_error().unwrap().violation,
            Violation::PortOutOfRange
        );
        assert_eq!(port.error().unwrap().kind(), "ValidationError");
    }

    #[tokio::test]
    async fn test_port_valid() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(&dir, "# @type=port @sensitive=false\nPORT=8080\n");
        let engine = engine(&[]);
        let doc = engine.load_schema(&path, None).unwrap();
        let report = engine.evaluate(&doc, &path, None).await.unwrap();
        assert!(report.ok());
        assert_eq!(
            report.field("PORT").unwrap().validated().unwrap().expose_secret(),
            &TypedValue::Port(8080)
        );
    }

    #[tokio::test]
    async fn test_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(
            &dir,
            "# @sensitive=false\nHOST=db\n# @sensitive=false\nURL=\"postgres://${HOST}:5432\"\nSECRET=\n",
        );
        let engine = engine(&[("SECRET", "abc")]);
        let doc = engine.load_schema(&path, None).unwrap();
        let first = engine.evaluate(&doc, &path, None).await.unwrap();
        let second = engine.evaluate(&doc, &path, None).await.unwrap();

        assert_eq!(first.outline(), second.outline());
        let opts = RenderOptions::default();
        assert_eq!(render(&first, &opts), render(&second, &opts));
        assert!(render(&first, &opts).contains("URL: postgres://db:5432"));
    }

    #[tokio::test]
    async fn test_cycle_produces_no_report() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(&dir, "A=\"${B}\"\nB=\"${A}\"\n");
        let engine = engine(&[]);
        let doc = engine.load_schema(&path, None).unwrap();
        let err = engine.evaluate(&doc, &path, None).await.unwrap_err();
        assert!(matches!(err, SchemaError::DependencyCycle(_)));
    }

    #[tokio::test]
    async fn test_unknown_resolver_is_field_error() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(&dir, "TOKEN=vault(secret/token)\n");
        let engine = engine(&[]);
        let doc = engine.load_schema(&path, None).unwrap();
        let report = engine.evaluate(&doc, &path, None).await.unwrap();
        assert_eq!(
            report.field("TOKEN").unwrap().resolution_error(),
            Some(&ResolutionError::UnknownResolver("vault".into()))
        );
    }

    #[tokio::test]
    async fn test_overlay_and_env_name() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(
            &dir,
            "# @type=enum(dev,prod) @sensitive=false\nAPP_ENV=dev\n# @sensitive=false\nLABEL=\"app-${ENVGUARD_ENV}\"\n",
        );
        fs::write(dir.path().join(".env.prod"), "APP_ENV=prod\n").unwrap();

        let engine = engine(&[]);
        let doc = engine.load_schema(&path, Some("prod")).unwrap();
        let report = engine.evaluate(&doc, &path, Some("prod")).await.unwrap();
        assert!(report.ok());
        let out = render(&report, &RenderOptions::default());
        assert!(out.contains("APP_ENV: prod"));
        assert!(out.contains("LABEL: app-prod"));
    }

    #[tokio::test]
    async fn test_custom_registry() {
        use crate::plugins::{ResolveContext, ValueResolver};
        use async_trait::async_trait;

        struct Vault;

        #[async_trait]
        impl ValueResolver for Vault {
            async fn resolve(
                &self,
                _kind: &str,
                args: &[String],
                _ctx: &ResolveContext,
            ) -> Result<Option<String>, ResolutionError> {
                Ok(args.first().map(|path| format!("secret-for-{}", path)))
            }
        }

        let dir = TempDir::new().unwrap();
        let path = write_schema(&dir, "TOKEN=vault(kv/token)
");
        let mut registry = ResolverRegistry::with_builtins();
        registry.register("vault", Vault);
        let engine = engine(&[]).with_registry(registry);

        let doc = engine.load_schema(&path, None).unwrap();
        let report = engine.evaluate(&doc, &path, None).await.unwrap();
        let token = report.field("TOKEN").unwrap();
        assert_eq!(token.raw().unwrap().expose_secret(), "secret-for-kv/token");
        assert!(!render(&report, &RenderOptions::default()).contains("secret-for"));
    }

    #[test]
    fn test_missing_overlay_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write_schema(&dir, "A=1\n");
        assert!(engine(&[]).load_schema(&path, Some("staging")).is_err());
    }

    #[test]
    fn test_missing_schema_is_error() {
        let dir = TempDir::new().unwrap();
        let err = engine(&[])
            .load_schema(&dir.path().join("nope.schema"), None)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read schema"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_resolver_runs_in_schema_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("token.txt"), "t0ken\n").unwrap();
        let path = write_schema(&dir, "TOKEN=exec(cat token.txt)\n");
        let engine = engine(&[]);
        let doc = engine.load_schema(&path, None).unwrap();
        let report = engine.evaluate(&doc, &path, None).await.unwrap();
        let token = report.field("TOKEN").unwrap();
        assert!(token.is_ok());
        assert_eq!(token.raw().unwrap().expose_secret(), "t0ken");
    }
}
