use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;
use crate::error::{OrchestratorError, Result};

pub const SIMULATED_MOUNT_POINT: &str = "/mnt/mock-uploads";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl MountResponse {
    pub fn simulated() -> Self {
        Self {
            message: "Mock storage mounted".to_string(),
            mount_point: Some(SIMULATED_MOUNT_POINT.to_string()),
            output: None,
        }
    }
}

pub fn mount_point(config: &StorageConfig) -> String {
    format!("/mnt/{}", config.container)
}

/// Python that mounts the blob container on the cluster's file system.
///
/// Mounting is skipped when the mount point already exists; either way the
/// script lists the mounted files so the output confirms access.
pub fn mount_script(config: &StorageConfig) -> Result<String> {
    let (Some(account), Some(key)) = (config.account_name(), config.account_key()) else {
        return Err(OrchestratorError::Configuration(
            "storage account credentials not configured".to_string(),
        ));
    };

    let container = py_literal(&config.container);
    let account = py_literal(&account);
    let key = py_literal(&key);

    Ok(format!(
        r#"container_name = {container}
storage_account_name = {account}
storage_account_key = {key}
mount_point = f"/mnt/{{container_name}}"

try:
    if not any(m.mountPoint == mount_point for m in dbutils.fs.mounts()):
        print(f"Mounting {{container_name}} to {{mount_point}}...")
        dbutils.fs.mount(
            source=f"wasbs://{{container_name}}@{{storage_account_name}}.blob.core.windows.net",
            mount_point=mount_point,
            extra_configs={{
                f"fs.azure.account.key.{{storage_account_name}}.blob.core.windows.net": storage_account_key
            }},
        )
        print(f"Successfully mounted at {{mount_point}}")
    else:
        print(f"Already mounted at {{mount_point}}")

    files = dbutils.fs.ls(mount_point)
    print(f"Verified access. Found {{len(files)}} files.")
except Exception as e:
    print(f"Error mounting storage: {{str(e)}}")
"#
    ))
}

/// Quote a value as a Python string literal.
fn py_literal(value: &str) -> String {
    // JSON string escaping is a valid subset of Python's.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> StorageConfig {
        StorageConfig {
            container: "uploads".to_string(),
            connection_string: Some(
                "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=s3cr3t==".to_string(),
            ),
        }
    }

    #[test]
    fn script_requires_credentials() {
        let err = mount_script(&StorageConfig::default()).unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn script_embeds_quoted_settings() {
        let script = mount_script(&configured()).unwrap();
        assert!(script.starts_with("container_name = \"uploads\"\n"));
        assert!(script.contains("storage_account_name = \"acct\""));
        assert!(script.contains("storage_account_key = \"s3cr3t==\""));
        assert!(script.contains("wasbs://{container_name}@{storage_account_name}.blob.core.windows.net"));
        assert!(script.contains("dbutils.fs.ls(mount_point)"));
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(py_literal(r#"a"b"#), r#""a\"b""#);
    }

    #[test]
    fn mount_point_uses_container() {
        assert_eq!(mount_point(&configured()), "/mnt/uploads");
    }

    #[test]
    fn simulated_response() {
        let resp = MountResponse::simulated();
        assert_eq!(resp.mount_point.as_deref(), Some("/mnt/mock-uploads"));
        assert!(resp.output.is_none());
    }
}
