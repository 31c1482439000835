//! Common request fixtures for k6-runner tests.

/// Request bodies for `POST /k6/run`.
pub mod requests {
    /// A plain GET with defaults for everything optional.
    pub const MINIMAL_GET: &str = r#"{"url": "https://example.com/a", "method": "GET"}"#;

    /// A GET with 10 VUs for 30 seconds and explicit empty headers.
    pub const GET_10_VUS: &str = r#"{
        "url": "https://example.com/a",
        "method": "GET",
        "headers": {},
        "vus": 10,
        "duration": "30s"
    }"#;

    /// A POST with JSON body and an authorization header.
    pub const POST_WITH_BODY: &str = r#"{
        "url": "https://api.example.com/users",
        "method": "POST",
        "headers": {"Authorization": "Bearer secret-token", "Content-Type": "application/json"},
        "body": "{\"name\": \"John\", \"age\": 30}",
        "vus": 5,
        "duration": "1m"
    }"#;

    /// Too many virtual users.
    pub const TOO_MANY_VUS: &str = r#"{"url": "https://example.com/a", "method": "GET", "vus": 5000}"#;

    /// A body declared as JSON that does not parse.
    pub const MALFORMED_BODY: &str =
        r#"{"url": "https://example.com/a", "method": "POST", "body": "{not json"}"#;

    /// A method outside the supported set.
    pub const UNSUPPORTED_METHOD: &str = r#"{"url": "https://example.com/a", "method": "TRACE"}"#;
}

/// Minimal templates that work with the fake engine.
pub mod templates {
    /// Declares only what the fake engine reads, plus the request line.
    pub const MINIMAL: &str = "const REPORT_PATH = '{{reportPath}}';\n\
                               // {{method}} {{url}} vus={{vus}} duration={{duration}}\n";
}
