//! Namespace configuration templates rendered before archival.

use std::path::PathBuf;

use serde::Deserialize;
use tenancy_core::{NamespaceName, QuotaPolicy, TemplateError, QUOTA_OBJECT_NAME};

pub const NAMESPACE_PLACEHOLDER: &str = "{{namespace}}";

/// Built-in document: the namespace and its quota, as provisioned.
pub const DEFAULT_TEMPLATE: &str = r#"apiVersion: v1
kind: Namespace
metadata:
  name: {{namespace}}
  labels:
    app.kubernetes.io/managed-by: tenancy
---
apiVersion: v1
kind: ResourceQuota
metadata:
  name: {{quota_name}}
  namespace: {{namespace}}
  labels:
    app.kubernetes.io/managed-by: tenancy
spec:
  hard:
    pods: "{{max_pods}}"
    requests.cpu: "{{requests_cpu}}"
    requests.memory: "{{requests_memory}}"
    limits.cpu: "{{limits_cpu}}"
    limits.memory: "{{limits_memory}}"
"#;

/// Where the raw template text comes from.
pub trait TemplateSource: Send + Sync {
    fn load(&self) -> Result<String, TemplateError>;
}

/// Template held in memory (the built-in one unless overridden).
#[derive(Debug, Clone)]
pub struct StaticTemplate(pub String);

impl Default for StaticTemplate {
    fn default() -> Self { Self(DEFAULT_TEMPLATE.to_string()) }
}

impl TemplateSource for StaticTemplate {
    fn load(&self) -> Result<String, TemplateError> { Ok(self.0.clone()) }
}

/// Template file on disk, re-read on every render.
#[derive(Debug, Clone)]
pub struct FileTemplate {
    path: PathBuf,
}

impl FileTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl TemplateSource for FileTemplate {
    fn load(&self) -> Result<String, TemplateError> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| TemplateError::Missing(format!("{}: {}", self.path.display(), e)))
    }
}

/// Substitute the namespace (and quota values) into `template` and check the
/// result parses as YAML.
pub fn render(template: &str, name: &NamespaceName, policy: &QuotaPolicy) -> Result<String, TemplateError> {
    if !template.contains(NAMESPACE_PLACEHOLDER) {
        return Err(TemplateError::NoPlaceholder(NAMESPACE_PLACEHOLDER));
    }
    let out = template
        .replace(NAMESPACE_PLACEHOLDER, name.as_str())
        .replace("{{quota_name}}", QUOTA_OBJECT_NAME)
        .replace("{{max_pods}}", &policy.max_pods.to_string())
        .replace("{{requests_cpu}}", &policy.requests_cpu.to_string())
        .replace("{{requests_memory}}", &policy.requests_memory.to_string())
        .replace("{{limits_cpu}}", &policy.limits_cpu.to_string())
        .replace("{{limits_memory}}", &policy.limits_memory.to_string());

    if let Some(pos) = out.find("{{") {
        let rest: String = out[pos..].chars().take_while(|c| !c.is_whitespace()).collect();
        return Err(TemplateError::Malformed(format!("unknown placeholder {}", rest)));
    }
    for doc in serde_yaml::Deserializer::from_str(&out) {
        serde_yaml::Value::deserialize(doc).map_err(|e| TemplateError::Malformed(e.to_string()))?;
    }
    Ok(out)
}

/// Load from `source` and render.
pub fn render_from(source: &dyn TemplateSource, name: &NamespaceName, policy: &QuotaPolicy) -> Result<String, TemplateError> {
    render(&source.load()?, name, policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team_a() -> NamespaceName { NamespaceName::new_unchecked("team-a") }

    #[test]
    fn default_template_renders_namespace_and_quota() {
        let out = render(DEFAULT_TEMPLATE, &team_a(), &QuotaPolicy::default()).unwrap();
        let docs: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&out)
            .map(|d| serde_yaml::Value::deserialize(d).unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["metadata"]["name"].as_str(), Some("team-a"));
        assert_eq!(docs[1]["metadata"]["namespace"].as_str(), Some("team-a"));
        assert_eq!(docs[1]["metadata"]["name"].as_str(), Some(QUOTA_OBJECT_NAME));
        assert_eq!(docs[1]["spec"]["hard"]["pods"].as_str(), Some("5"));
        assert_eq!(docs[1]["spec"]["hard"]["limits.memory"].as_str(), Some("5Gi"));
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let err = render("kind: Namespace\n", &team_a(), &QuotaPolicy::default()).unwrap_err();
        assert!(matches!(err, TemplateError::NoPlaceholder(_)));
    }

    #[test]
    fn malformed_yaml_and_unknown_placeholders_are_rejected() {
        let err = render("name: {{namespace}}\n  bad: [", &team_a(), &QuotaPolicy::default()).unwrap_err();
        assert!(matches!(err, TemplateError::Malformed(_)), "{err}");
        let err = render("name: {{namespace}}\nowner: {{owner}}\n", &team_a(), &QuotaPolicy::default()).unwrap_err();
        assert!(err.to_string().contains("{{owner}}"), "{err}");
    }

    #[test]
    fn missing_file_is_a_template_error() {
        let src = FileTemplate::new("/nonexistent/tenancy/template.yaml");
        let err = render_from(&src, &team_a(), &QuotaPolicy::default()).unwrap_err();
        assert!(matches!(err, TemplateError::Missing(_)));
    }

    #[test]
    fn file_template_is_reread() {
        let path = std::env::temp_dir().join(format!(
            "tenancy-template-{}.yaml",
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ));
        let src = FileTemplate::new(&path);
        std::fs::write(&path, "broken: true\n").unwrap();
        assert!(render_from(&src, &team_a(), &QuotaPolicy::default()).is_err());
        std::fs::write(&path, "name: {{namespace}}\n").unwrap();
        assert_eq!(render_from(&src, &team_a(), &QuotaPolicy::default()).unwrap(), "name: team-a\n");
        let _ = std::fs::remove_file(&path);
    }
}
