use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    #[serde(rename = "argocd")]
    ArgoCd,
    #[serde(rename = "tekton")]
    Tekton,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::ArgoCd => "argocd",
            TargetKind::Tekton => "tekton",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetKind::ArgoCd => "ArgoCD",
            TargetKind::Tekton => "Tekton",
        }
    }
}

/// Entry returned by `GET /api/targets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TargetKind,
}

impl TargetInfo {
    pub fn new(kind: TargetKind, key: &str) -> Self {
        Self {
            key: key.to_string(),
            name: display_name(kind, key),
            kind,
        }
    }
}

/// Human-readable label for a target key.
///
/// `prod` and `test` have fixed labels; any other key gets its first character upper-cased
/// and the rest left untouched.
pub fn display_name(kind: TargetKind, key: &str) -> String {
    match key {
        "prod" => format!("{} Prod", kind.label()),
        "test" => format!("{} Test", kind.label()),
        _ => {
            let mut chars = key.chars();
            let capitalized = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            };
            format!("{} {}", kind.label(), capitalized)
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Merged view of one ArgoCD application: listing entry plus its detail fetch.
///
/// Empty `deployment_name`/`deployment_namespace` mean the application has no
/// `Deployment` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSummary {
    pub name: String,
    pub app_namespace: String,
    pub deployment_name: String,
    pub deployment_namespace: String,
    pub health: String,
    pub project: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartRequest {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub deployment_name: String,
    #[serde(default)]
    pub deployment_namespace: String,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartResponse {
    pub result: String,
    pub deployment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub result: String,
    pub app: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_uses_fixed_labels_for_prod_and_test() {
        assert_eq!(display_name(TargetKind::ArgoCd, "prod"), "ArgoCD Prod");
        assert_eq!(display_name(TargetKind::ArgoCd, "test"), "ArgoCD Test");
        assert_eq!(display_name(TargetKind::Tekton, "prod"), "Tekton Prod");
    }

    #[test]
    fn display_name_capitalizes_only_first_letter() {
        assert_eq!(display_name(TargetKind::ArgoCd, "staging"), "ArgoCD Staging");
        assert_eq!(display_name(TargetKind::Tekton, "dr-site"), "Tekton Dr-site");
        assert_eq!(display_name(TargetKind::ArgoCd, "eu_WEST"), "ArgoCD Eu_WEST");
        assert_eq!(display_name(TargetKind::ArgoCd, ""), "ArgoCD ");
    }

    #[test]
    fn target_info_serializes_kind_as_type() {
        let info = TargetInfo::new(TargetKind::Tekton, "staging");
        let value = serde_json::to_value(&info).expect("target info should serialize");
        assert_eq!(
            value,
            serde_json::json!({"key": "staging", "name": "Tekton Staging", "type": "tekton"})
        );
    }

    #[test]
    fn app_summary_uses_camel_case_fields() {
        let summary = AppSummary {
            name: "web".to_string(),
            app_namespace: "argocd".to_string(),
            deployment_name: "web".to_string(),
            deployment_namespace: "apps".to_string(),
            health: "Healthy".to_string(),
            project: "default".to_string(),
        };

        let value = serde_json::to_value(&summary).expect("summary should serialize");
        assert_eq!(value["appNamespace"], "argocd");
        assert_eq!(value["deploymentNamespace"], "apps");
    }

    #[test]
    fn restart_request_without_target_defaults_to_none() {
        let req: RestartRequest = serde_json::from_value(serde_json::json!({
            "appName": "web",
            "deploymentName": "web",
            "deploymentNamespace": "apps"
        }))
        .expect("restart request should parse");
        assert_eq!(req.target, None);
    }

    #[test]
    fn login_request_debug_redacts_password() {
        let req = LoginRequest {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", req);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
