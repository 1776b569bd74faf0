//! Resolver plugins
//!
//! A call expression `kind(args)` is handed to the resolver registered under
//! `kind`. Two kinds are built in:
//! - `exec(program arg...)` runs a command and uses its trimmed stdout
//! - `env(NAME [fallback])` reads another environment variable
//!
//! More kinds can be registered without touching the parser, either in code
//! or through the `resolvers` config map (command-prefix aliases).

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ResolutionError;
use crate::expr::is_identifier;

/// Read-only inputs available to every resolver
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// Snapshot of the process environment
    pub env: Arc<HashMap<String, String>>,
    /// Per-call timeout for external commands
    pub timeout: Duration,
    /// Working directory for external commands (the schema's directory)
    pub cwd: PathBuf,
}

impl ResolveContext {
    pub fn new(env: HashMap<String, String>, timeout: Duration, cwd: PathBuf) -> Self {
        Self {
            env: Arc::new(env),
            timeout,
            cwd,
        }
    }
}

/// A source of raw values for call expressions
#[async_trait]
pub trait ValueResolver: Send + Sync {
    /// Produce a value from already-interpolated arguments.
    ///
    /// `Ok(None)` means the source has no value; the field's required-ness
    /// decides whether that is an error.
    async fn resolve(
        &self,
        kind: &str,
        args: &[String],
        ctx: &ResolveContext,
    ) -> Result<Option<String>, ResolutionError>;
}

/// Resolvers keyed by call kind
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn ValueResolver>>,
}

impl ResolverRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `exec` and `env`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("exec", CommandResolver::new(Vec::new()));
        registry.register("env", EnvResolver);
        registry
    }

    /// Add command-prefix aliases (e.g. `op` -> `op read`)
    pub fn with_aliases(mut self, aliases: &BTreeMap<String, Vec<String>>) -> Self {
        for (kind, prefix) in aliases {
            self.register(kind, CommandResolver::new(prefix.clone()));
        }
        self
    }

    /// Register (or replace) the resolver for a kind
    pub fn register(&mut self, kind: &str, resolver: impl ValueResolver + 'static) {
        self.resolvers.insert(kind.to_string(), Arc::new(resolver));
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ValueResolver>> {
        self.resolvers.get(kind).cloned()
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Dispatch a call to its resolver
    pub async fn resolve(
        &self,
        kind: &str,
        args: &[String],
        ctx: &ResolveContext,
    ) -> Result<Option<String>, ResolutionError> {
        let resolver = self
            .get(kind)
            .ok_or_else(|| ResolutionError::UnknownResolver(kind.to_string()))?;
        resolver.resolve(kind, args, ctx).await
    }
}

/// Runs `prefix + args` and returns trimmed stdout
pub struct CommandResolver {
    prefix: Vec<String>,
}

impl CommandResolver {
    pub fn new(prefix: Vec<String>) -> Self {
        Self { prefix }
    }
}

#[async_trait]
impl ValueResolver for CommandResolver {
    async fn resolve(
        &self,
        kind: &str,
        args: &[String],
        ctx: &ResolveContext,
    ) -> Result<Option<String>, ResolutionError> {
        let mut argv = self.prefix.iter().chain(args.iter());
        let program = argv.next().ok_or_else(|| ResolutionError::InvalidArguments {
            kind: kind.to_string(),
            reason: "no command given".to_string(),
        })?;

        let path = envguard_core::process::find_program(program).ok_or_else(|| {
            ResolutionError::Unavailable {
                kind: kind.to_string(),
                reason: format!("'{}' not found on PATH", program),
            }
        })?;

        // Arguments may be interpolated secrets; log the kind only.
        debug!(kind, args = self.prefix.len() + args.len(), "running resolver command");

        let child = Command::new(path)
            .args(argv)
            .current_dir(&ctx.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ResolutionError::Unavailable {
                kind: kind.to_string(),
                reason: format!("failed to start '{}': {}", program, e.kind()),
            })?;

        // Dropping the timed-out future drops the child, which kills it.
        let output = match timeout(ctx.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ResolutionError::Plugin {
                    kind: kind.to_string(),
                    message: format!("waiting for '{}' failed: {}", program, e.kind()),
                })
            }
            Err(_) => {
                return Err(ResolutionError::Timeout {
                    program: program.clone(),
                    secs: ctx.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            debug!(
                kind,
                stderr_bytes = output.stderr.len(),
                "resolver command failed"
            );
            return Err(ResolutionError::CommandFailed {
                program: program.clone(),
                code: output.status.code(),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| ResolutionError::NotUtf8 {
            program: program.clone(),
        })?;
        Ok(Some(stdout.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// `env(NAME)` or `env(NAME, fallback)`
pub struct EnvResolver;

#[async_trait]
impl ValueResolver for EnvResolver {
    async fn resolve(
        &self,
        kind: &str,
        args: &[String],
        ctx: &ResolveContext,
    ) -> Result<Option<String>, ResolutionError> {
        let invalid = |reason: &str| ResolutionError::InvalidArguments {
            kind: kind.to_string(),
            reason: reason.to_string(),
        };

        // The comma may sit anywhere among the shell-split words:
        // `NAME,fallback`, `NAME, fallback` and `NAME , fallback` all work.
        let joined = args.join(" ");
        let (name, fallback) = match joined.split_once(',') {
            Some((name, fallback)) => (name.trim(), Some(fallback.trim())),
            None => match args {
                [name] => (name.as_str(), None),
                [name, fallback] => (name.as_str(), Some(fallback.as_str())),
                _ => return Err(invalid("expected NAME or NAME, fallback")),
            },
        };
        if !is_identifier(name) {
            return Err(invalid("expected a variable name"));
        }

        let value = ctx.env.get(name).cloned();
        Ok(match fallback {
            Some(fallback) => Some(value.unwrap_or_else(|| fallback.to_string())),
            None => value,
        })
    }
}
