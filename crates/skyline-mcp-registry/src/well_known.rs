//! Well-known spec URL aliases.
//!
//! Profile configs may name a popular service instead of pasting a spec URL;
//! the alias resolves to the canonical published description before fetch.

/// Resolve a well-known service alias to its canonical spec URL.
pub fn resolve_alias(name: &str) -> Option<&'static str> {
    let url = match name.to_ascii_lowercase().as_str() {
        "slack" => "https://api.slack.com/specs/openapi/v2/slack_web.json",
        "github" => {
            "https://raw.githubusercontent.com/github/rest-api-description/main/descriptions/api.github.com/api.github.com.json"
        }
        "gitlab" => "https://gitlab.com/api/v4/openapi.json",
        "jira" => "https://dac-static.atlassian.com/cloud/jira/platform/swagger-v3.v3.json",
        "confluence" => "https://dac-static.atlassian.com/cloud/confluence/swagger.v3.json",
        "stripe" => {
            "https://raw.githubusercontent.com/stripe/openapi/master/openapi/spec3.json"
        }
        "sendgrid" => {
            "https://raw.githubusercontent.com/sendgrid/sendgrid-oai/main/oai.json"
        }
        "digitalocean" => {
            "https://api-engineering.nyc3.cdn.digitaloceanspaces.com/spec-ci/DigitalOcean-public.v2.yaml"
        }
        _ => return None,
    };
    Some(url)
}
