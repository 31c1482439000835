//! k6 script generation.
//!
//! Turns a validated [`TestParameters`] record into the text of a k6 script by
//! substituting escaped values into a named template. Every user-supplied
//! string goes through [`escape_js_string`] so it cannot terminate the string
//! literal it lands in.
//!
//! ```
//! use std::path::Path;
//! use k6_script::{HttpMethod, ScriptGenerator, TestParameters};
//!
//! let params = TestParameters::new("https://example.com/a", HttpMethod::Get)
//!     .with_vus(10)
//!     .with_duration("30s");
//!
//! let generator = ScriptGenerator::with_builtin_template();
//! let script = generator
//!     .generate(&params, Path::new("/tmp/reports/k6-report.html"))
//!     .unwrap();
//!
//! assert!(script.text().contains("'https://example.com/a'"));
//! ```

pub mod error;
pub mod escape;
pub mod generator;
pub mod params;
pub mod template;

pub use error::{Result, ScriptError};
pub use escape::escape_js_string;
pub use generator::{GeneratedScript, ScriptGenerator};
pub use params::{
    parse_duration, BodyFormat, HttpMethod, TestParameters, MAX_TEST_DURATION, MAX_VUS,
    MIN_VUS,
};
pub use template::{
    render, StaticTemplates, TemplateDir, TemplateSource, BUILTIN_K6_TEMPLATE,
    DEFAULT_TEMPLATE_NAME,
};
