//! Application source types and the specs parsed from their manifests

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Packaging format of a discovered application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AppSourceType {
    /// `app.yaml` confirmed by a sibling `components/params.libsonnet`
    DeclarativeTemplate,
    /// Directory holding a `Chart.yaml`
    PackagedChart,
    /// Directory holding a kustomization file
    OverlayComposition,
    /// Plain manifests, no recognized marker
    PlainDirectory,
}

impl AppSourceType {
    /// Tie-break when several markers share one directory (lower wins)
    pub fn priority(&self) -> u8 {
        match self {
            AppSourceType::PackagedChart => 0,
            AppSourceType::OverlayComposition => 1,
            AppSourceType::DeclarativeTemplate => 2,
            AppSourceType::PlainDirectory => 3,
        }
    }
}

impl std::fmt::Display for AppSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AppSourceType::DeclarativeTemplate => "DeclarativeTemplate",
            AppSourceType::PackagedChart => "PackagedChart",
            AppSourceType::OverlayComposition => "OverlayComposition",
            AppSourceType::PlainDirectory => "PlainDirectory",
        };
        f.write_str(s)
    }
}

/// An application found in a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    /// Directory of the application, relative to the repository root
    pub path: String,
    #[serde(rename = "type")]
    pub app_type: AppSourceType,
}

/// Details of the application at a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AppDetails {
    DeclarativeTemplate(DeclarativeTemplateSpec),
    PackagedChart(PackagedChartSpec),
    OverlayComposition(OverlayCompositionSpec),
    PlainDirectory,
}

impl AppDetails {
    pub fn source_type(&self) -> AppSourceType {
        match self {
            AppDetails::DeclarativeTemplate(_) => AppSourceType::DeclarativeTemplate,
            AppDetails::PackagedChart(_) => AppSourceType::PackagedChart,
            AppDetails::OverlayComposition(_) => AppSourceType::OverlayComposition,
            AppDetails::PlainDirectory => AppSourceType::PlainDirectory,
        }
    }
}

/// Parsed `app.yaml` of a declarative template application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarativeTemplateSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub environments: BTreeMap<String, TemplateEnvironment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateEnvironment {
    #[serde(default)]
    pub path: String,

    #[serde(default, rename = "k8sVersion")]
    pub k8s_version: String,

    #[serde(default)]
    pub destination: TemplateDestination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDestination {
    #[serde(default)]
    pub server: String,

    #[serde(default)]
    pub namespace: String,
}

/// Parsed `Chart.yaml` plus the values files beside it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagedChartSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Values files, relative to `path`
    #[serde(default)]
    pub value_files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayCompositionSpec {
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template_app() {
        let yaml = r#"
apiVersion: 0.3.0
kind: ksonnet.io/app
name: guestbook
version: 0.0.1
environments:
  default:
    destination:
      namespace: default
      server: https://kubernetes.default.svc
    k8sVersion: v1.10.0
    path: default
"#;
        let spec: DeclarativeTemplateSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.name, "guestbook");
        let env = &spec.environments["default"];
        assert_eq!(env.k8s_version, "v1.10.0");
        assert_eq!(env.destination.namespace, "default");
    }

    #[test]
    fn test_parse_chart_metadata_ignores_unknown_fields() {
        let yaml = "apiVersion: v2\nname: wordpress\nversion: 5.7.1\ndescription: Blog\nkeywords: [cms]\n";
        let spec: PackagedChartSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.name, "wordpress");
        assert_eq!(spec.version.as_deref(), Some("5.7.1"));
        assert!(spec.value_files.is_empty());
    }

    #[test]
    fn test_details_tagging() {
        let details = AppDetails::OverlayComposition(OverlayCompositionSpec {
            path: "overlays/prod".to_string(),
        });
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "OverlayComposition");
        assert_eq!(json["path"], "overlays/prod");
        assert_eq!(details.source_type(), AppSourceType::OverlayComposition);

        let plain = serde_json::to_value(AppDetails::PlainDirectory).unwrap();
        assert_eq!(plain["type"], "PlainDirectory");
    }

    #[test]
    fn test_priority_order() {
        let mut types = vec![
            AppSourceType::DeclarativeTemplate,
            AppSourceType::OverlayComposition,
            AppSourceType::PackagedChart,
        ];
        types.sort_by_key(|t| t.priority());
        assert_eq!(types[0], AppSourceType::PackagedChart);
        assert_eq!(types[2], AppSourceType::DeclarativeTemplate);
    }
}
