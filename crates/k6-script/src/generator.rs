//! Script generation from parameters and a named template.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, ScriptError};
use crate::escape::escape_js_string;
use crate::params::TestParameters;
use crate::template::{render, StaticTemplates, TemplateSource, DEFAULT_TEMPLATE_NAME};

/// A rendered k6 script together with the report path baked into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScript {
    text: String,
    report_path: PathBuf,
    test_duration: Duration,
}

impl GeneratedScript {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Where k6 has been told to write the HTML report.
    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// The requested test duration, used to bound the subprocess wait.
    pub fn test_duration(&self) -> Duration {
        self.test_duration
    }
}

/// Renders k6 scripts from one named template.
#[derive(Clone)]
pub struct ScriptGenerator {
    templates: Arc<dyn TemplateSource>,
    template_name: String,
}

impl std::fmt::Debug for ScriptGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptGenerator")
            .field("template_name", &self.template_name)
            .finish_non_exhaustive()
    }
}

impl ScriptGenerator {
    pub fn new(templates: Arc<dyn TemplateSource>, template_name: impl Into<String>) -> Self {
        Self {
            templates,
            template_name: template_name.into(),
        }
    }

    /// Generator backed by the bundled template.
    pub fn with_builtin_template() -> Self {
        Self::new(Arc::new(StaticTemplates::builtin()), DEFAULT_TEMPLATE_NAME)
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// Validates `params` and renders the script.
    ///
    /// Validation runs before the template is looked up, so a bad request
    /// never reaches the template source. `report_path` must be absolute; k6
    /// resolves relative paths against its own working directory.
    pub fn generate(&self, params: &TestParameters, report_path: &Path) -> Result<GeneratedScript> {
        params.validate()?;

        if !report_path.is_absolute() {
            return Err(ScriptError::invalid(
                "reportPath",
                format!("{} is not absolute", report_path.display()),
            ));
        }
        let report_path_text = report_path.to_str().ok_or_else(|| {
            ScriptError::invalid("reportPath", "path is not valid UTF-8")
        })?;

        let template = self.templates.load(&self.template_name)?;

        let body = params.canonical_body()?;
        let has_body = body.is_some();
        if has_body && !params.method.conventionally_has_body() {
            debug!(method = %params.method, "Request body supplied for a method that usually has none");
        }

        let mut context: HashMap<&str, String> = HashMap::new();
        context.insert("url", escape_js_string(&params.url));
        // method and duration come from closed vocabularies checked in validate()
        context.insert("method", params.method.as_str().to_string());
        context.insert("duration", params.duration.clone());
        context.insert("vus", params.vus.to_string());
        context.insert("headers", escape_js_string(&params.canonical_headers()?));
        context.insert(
            "payload",
            body.as_deref().map(escape_js_string).unwrap_or_default(),
        );
        context.insert("hasBody", has_body.to_string());
        context.insert("reportPath", escape_js_string(report_path_text));

        let text = render(&template, &context)?;

        debug!(
            template = %self.template_name,
            method = %params.method,
            vus = params.vus,
            duration = %params.duration,
            bytes = text.len(),
            "Generated k6 script"
        );

        Ok(GeneratedScript {
            text,
            report_path: report_path.to_path_buf(),
            test_duration: params.test_duration()?,
        })
    }
}
