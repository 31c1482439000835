//! Script templates: lookup by name and placeholder rendering.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use tracing::debug;

use crate::error::{Result, ScriptError};

/// Name of the bundled k6 template.
pub const DEFAULT_TEMPLATE_NAME: &str = "k6-template.js.hbs";

/// The bundled k6 template.
pub const BUILTIN_K6_TEMPLATE: &str = include_str!("../templates/k6-template.js.hbs");

/// Looks up template text by name.
pub trait TemplateSource: Send + Sync {
    /// Returns the template text, or [`ScriptError::TemplateNotFound`].
    fn load(&self, name: &str) -> Result<String>;
}

/// Templates read from a directory on every lookup.
#[derive(Debug, Clone)]
pub struct TemplateDir {
    dir: PathBuf,
}

impl TemplateDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TemplateSource for TemplateDir {
    fn load(&self, name: &str) -> Result<String> {
        // Names are plain file names; anything that could walk out of the
        // directory is treated as absent.
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ScriptError::TemplateNotFound(name.to_string()));
        }

        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!(template = %path.display(), "Loaded template");
                Ok(text)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ScriptError::TemplateNotFound(path.display().to_string()))
            }
            Err(e) => Err(ScriptError::Template(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// In-memory templates keyed by name.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplates {
    templates: HashMap<String, String>,
}

impl StaticTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds only the bundled template under [`DEFAULT_TEMPLATE_NAME`].
    pub fn builtin() -> Self {
        Self::new().with_template(DEFAULT_TEMPLATE_NAME, BUILTIN_K6_TEMPLATE)
    }

    pub fn with_template(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.templates.insert(name.into(), text.into());
        self
    }
}

impl TemplateSource for StaticTemplates {
    fn load(&self, name: &str) -> Result<String> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::TemplateNotFound(name.to_string()))
    }
}

/// Name the template is compiled under; it only shows up in error messages.
const RENDER_NAME: &str = "k6-script";

/// Replaces every `{{name}}` tag in `template` with its value from `context`.
///
/// Values are copied through untouched: no auto-escaping, and a value that
/// itself contains `{{...}}` is never expanded. A tag naming a key missing
/// from `context`, or a tag that does not parse, is an error.
pub fn render(template: &str, context: &HashMap<&str, String>) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);

    let compiled = env
        .template_from_named_str(RENDER_NAME, template)
        .map_err(template_error)?;

    let mut unknown: Vec<String> = compiled
        .undeclared_variables(false)
        .into_iter()
        .filter(|name| !context.contains_key(name.as_str()))
        .collect();
    unknown.sort();
    if let Some(name) = unknown.first() {
        return Err(ScriptError::Template(format!("unknown placeholder '{}'", name)));
    }

    compiled.render(context).map_err(template_error)
}

fn template_error(err: minijinja::Error) -> ScriptError {
    match err.line() {
        Some(line) => ScriptError::Template(format!("{} on line {}", err, line)),
        None => ScriptError::Template(err.to_string()),
    }
}
